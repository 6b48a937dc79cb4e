//! Single-shot adapters for page loads.
//!
//! A pager takes exactly one result from every page load. Page loads are futures, so they can't
//! produce more than one result, but some page sources are naturally multi-shot streams, like a
//! subscription to a subject that keeps publishing pages. [`first_output`] turns such a stream
//! into a page load that resolves with its first element and drops the rest.
use futures::stream::{Stream, StreamExt};

/// The error of a page load built with [`first_output`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SingleShotError<E> {
    /// The stream ended without producing any element.
    #[error("page source completed without producing a page")]
    Empty,
    /// The first element of the stream was an error.
    #[error("page source failed: {0}")]
    Failed(E),
}

impl<E> SingleShotError<E> {
    /// The error produced by the page source, if there was one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Empty => None,
            Self::Failed(err) => Some(err),
        }
    }
}

/// Resolves with the first element of `stream`. The stream is dropped right after it, so any
/// further elements are never observed.
pub async fn first_output<S, T, E>(stream: S) -> Result<T, SingleShotError<E>>
where
    S: Stream<Item = Result<T, E>>,
{
    let mut stream = std::pin::pin!(stream);
    match stream.next().await {
        Some(Ok(value)) => Ok(value),
        Some(Err(err)) => Err(SingleShotError::Failed(err)),
        None => Err(SingleShotError::Empty),
    }
}
