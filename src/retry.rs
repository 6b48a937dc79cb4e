//! Starting a stream on a signal, and restarting it once after a failure.
//!
//! [`AfterOutputOfExt::after_output_of`] holds a stream back until another stream, the source,
//! emits an element that meets a condition. Nothing is polled from the held back stream before
//! that. A source that ends without such an element keeps the output pending forever.
//!
//! [`retry`] restarts a fallible stream from a fresh attempt when it fails, and
//! [`retry_on_output_of`] combines both: the attempt starts once the source meets the condition
//! and a failed attempt is started over once.
use futures::{
    ready,
    stream::{Fuse, FusedStream, Stream, StreamExt, TryStream},
};
use pin_project_lite::pin_project;
use std::{
    pin::Pin,
    task::{Context, Poll},
};

pin_project! {
    /// Stream for the [`after_output_of`](AfterOutputOfExt::after_output_of) method.
    #[must_use = "streams do nothing unless polled"]
    pub struct WaitUntilOutputOf<Src, St, C> {
        #[pin]
        source: Option<Fuse<Src>>,
        condition: C,
        #[pin]
        upstream: St,
    }
}

impl<Src, St, C> WaitUntilOutputOf<Src, St, C>
where
    Src: Stream,
    C: FnMut(&Src::Item) -> bool,
{
    fn new(upstream: St, source: Src, condition: C) -> Self {
        Self {
            source: Some(source.fuse()),
            condition,
            upstream,
        }
    }

    /// Whether the source has met the condition and the upstream is being forwarded.
    pub fn is_started(&self) -> bool {
        self.source.is_none()
    }
}

impl<Src, St, C> Stream for WaitUntilOutputOf<Src, St, C>
where
    Src: Stream,
    St: Stream,
    C: FnMut(&Src::Item) -> bool,
{
    type Item = St::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        while let Some(source) = this.source.as_mut().as_pin_mut() {
            let source_done = source.is_done();
            match ready!(source.poll_next(cx)) {
                Some(output) if (this.condition)(&output) => {
                    tracing::debug!("wait condition met, starting upstream");
                    this.source.set(None);
                }
                Some(_) => tracing::trace!("source output doesn't meet the wait condition"),
                None => {
                    if !source_done {
                        tracing::debug!("source ended before meeting the wait condition");
                    }

                    return Poll::Pending;
                }
            }
        }

        this.upstream.poll_next(cx)
    }
}

/// Extension trait providing [`after_output_of`](AfterOutputOfExt::after_output_of) for any
/// stream.
pub trait AfterOutputOfExt: Stream {
    /// Holds `self` back until `source` emits an element for which `condition` returns `true`,
    /// then forwards all of `self`. Source elements that don't meet the condition are dropped.
    fn after_output_of<Src, C>(self, source: Src, condition: C) -> WaitUntilOutputOf<Src, Self, C>
    where
        Self: Sized,
        Src: Stream,
        C: FnMut(&Src::Item) -> bool,
    {
        WaitUntilOutputOf::new(self, source, condition)
    }

    /// Holds `self` back until the first element of `source`, whatever it is.
    #[allow(clippy::type_complexity)]
    fn after_first_output_of<Src>(
        self,
        source: Src,
    ) -> WaitUntilOutputOf<Src, Self, fn(&Src::Item) -> bool>
    where
        Self: Sized,
        Src: Stream,
    {
        let any: fn(&Src::Item) -> bool = |_| true;
        WaitUntilOutputOf::new(self, source, any)
    }
}

impl<S: Stream + ?Sized> AfterOutputOfExt for S {}

pin_project! {
    /// Stream for the [`retry`] function.
    #[must_use = "streams do nothing unless polled"]
    pub struct Retry<F, St> {
        make_attempt: F,
        #[pin]
        attempt: Option<St>,
        retries_left: usize,
        terminated: bool,
    }
}

impl<F, St> Retry<F, St> {
    /// How many more times a failed attempt will be started over.
    pub fn retries_left(&self) -> usize {
        self.retries_left
    }
}

impl<F, St> Stream for Retry<F, St>
where
    F: FnMut() -> St,
    St: TryStream,
{
    type Item = Result<St::Ok, St::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if *this.terminated {
            return Poll::Ready(None);
        }

        loop {
            let attempt = match this.attempt.as_mut().as_pin_mut() {
                Some(attempt) => attempt,
                None => {
                    this.attempt.set(Some((this.make_attempt)()));
                    continue;
                }
            };

            match ready!(attempt.try_poll_next(cx)) {
                Some(Ok(item)) => return Poll::Ready(Some(Ok(item))),
                Some(Err(_)) if *this.retries_left > 0 => {
                    *this.retries_left -= 1;
                    tracing::debug!(
                        retries_left = *this.retries_left,
                        "attempt failed, starting over"
                    );
                    this.attempt.set(None);
                }
                Some(Err(err)) => {
                    *this.terminated = true;
                    this.attempt.set(None);
                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    *this.terminated = true;
                    this.attempt.set(None);
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl<F, St> FusedStream for Retry<F, St>
where
    F: FnMut() -> St,
    St: TryStream,
{
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

/// Runs the stream made by `make_attempt` and starts it over with a fresh one when it fails, at
/// most `retries` times. Elements emitted before a failure stay emitted. The error ending the
/// last allowed attempt is forwarded and ends the output.
///
/// The first attempt is made when the output is polled for the first time.
pub fn retry<F, St>(make_attempt: F, retries: usize) -> Retry<F, St>
where
    F: FnMut() -> St,
    St: TryStream,
{
    Retry {
        make_attempt,
        attempt: None,
        retries_left: retries,
        terminated: false,
    }
}

/// Starts the attempt made by `make_attempt` once `source` emits an element meeting `condition`
/// and starts it over once if it fails.
pub fn retry_on_output_of<F, St, Src, C>(
    make_attempt: F,
    source: Src,
    condition: C,
) -> WaitUntilOutputOf<Src, Retry<F, St>, C>
where
    F: FnMut() -> St,
    St: TryStream,
    Src: Stream,
    C: FnMut(&Src::Item) -> bool,
{
    retry(make_attempt, 1).after_output_of(source, condition)
}

/// [`retry_on_output_of`] that starts on the first element of `source`. Handy for `()` signals.
#[allow(clippy::type_complexity)]
pub fn retry_on_first_output_of<F, St, Src>(
    make_attempt: F,
    source: Src,
) -> WaitUntilOutputOf<Src, Retry<F, St>, fn(&Src::Item) -> bool>
where
    F: FnMut() -> St,
    St: TryStream,
    Src: Stream,
{
    retry(make_attempt, 1).after_first_output_of(source)
}
