//! Building blocks of `single_page` loaders. The flavour modules implement their `PageProvider`
//! for [`SourceProvider`].
use crate::Page;
use futures::stream::{self, Stream, StreamExt};
use std::sync::{Mutex, PoisonError};

/// A page that holds exactly one value and never has a next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinglePage<V> {
    value: V,
}

impl<V> SinglePage<V> {
    pub fn new(value: V) -> Self {
        Self { value }
    }

    pub fn into_value(self) -> V {
        self.value
    }
}

impl<V> Page for SinglePage<V> {
    type Item = V;

    fn items(&self) -> &[V] {
        std::slice::from_ref(&self.value)
    }

    fn has_next_page(&self) -> bool {
        false
    }
}

/// Loads every page by calling `source` afresh, regardless of the previous page.
///
/// The trigger sits behind a mutex only so that the provider is `Sync` for any `Send` trigger. It
/// is never locked, see [`SourceProvider::take_trigger`].
pub struct SourceProvider<F, T> {
    pub source: F,
    trigger: Mutex<Option<T>>,
}

pub type SourceTrigger<T> = stream::Flatten<stream::Iter<std::option::IntoIter<T>>>;

impl<F, T> SourceProvider<F, T>
where
    T: Stream<Item = ()>,
{
    pub fn new(source: F, trigger: T) -> Self {
        Self {
            source,
            trigger: Mutex::new(Some(trigger)),
        }
    }

    /// Hands out the trigger once. Later calls get an empty stream, so a pager started with it
    /// never retries after an unsuccessful attempt.
    pub fn take_trigger(&mut self) -> SourceTrigger<T> {
        let trigger = self
            .trigger
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        stream::iter(trigger).flatten()
    }
}
