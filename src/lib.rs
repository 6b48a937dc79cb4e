#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("doc/Main.md")]

#[cfg(feature = "local")]
#[cfg_attr(docsrs, doc(cfg(feature = "local")))]
pub mod local;

#[cfg(feature = "mt")]
pub mod mt;

#[cfg(feature = "dynamic")]
#[cfg_attr(docsrs, doc(cfg(feature = "dynamic")))]
pub use mt::dynamic;

pub mod gate;
pub mod retry;
pub mod single_shot;

// `mt` is enabled by default so prelude reexports the mt::prelude. Users will need to specify a
// prelude module manually like `trigger_pager::local::prelude::*` if they want to use other
// flavours of providers.
#[cfg(feature = "mt")]
#[doc = include_str!("doc/prelude")]
pub mod prelude {
    pub use crate::mt::prelude::*;
}

// `mt` is enabled by default so it's reexported into the root.
#[cfg(feature = "mt")]
pub use crate::mt::*;

pub use gate::{SingleFlightExt, TrySingleFlightExt};
pub use retry::{retry, retry_on_first_output_of, retry_on_output_of, AfterOutputOfExt};
pub use single_shot::{first_output, SingleShotError};

/// A single fetched page.
///
/// A page should carry everything a provider needs to request the page after it, such as a
/// cursor, a token or an offset, because the pager hands the last successfully loaded page back
/// to [`PageProvider::load_next_page`](crate::mt::PageProvider::load_next_page).
pub trait Page {
    type Item;

    /// Items of this page in order. May be empty.
    fn items(&self) -> &[Self::Item];

    /// Whether there is another page after this one. The pager finishes right after emitting a
    /// successful page that returns `false` here.
    fn has_next_page(&self) -> bool;
}

/// The record of one pagination attempt.
///
/// `previous` is the last page successfully loaded before this attempt and `outcome` is what the
/// attempt produced. Failures never move the position: a failed attempt is retried with the same
/// `previous` on the next trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageResult<P, E> {
    pub previous: Option<P>,
    pub outcome: Result<P, E>,
}

impl<P, E> PageResult<P, E> {
    pub fn new(previous: Option<P>, outcome: Result<P, E>) -> Self {
        Self { previous, outcome }
    }

    pub fn success(previous: Option<P>, page: P) -> Self {
        Self::new(previous, Ok(page))
    }

    pub fn failure(previous: Option<P>, error: E) -> Self {
        Self::new(previous, Err(error))
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }

    /// The page loaded by this attempt, if it succeeded.
    pub fn page(&self) -> Option<&P> {
        self.outcome.as_ref().ok()
    }

    /// The error of this attempt, if it failed.
    pub fn error(&self) -> Option<&E> {
        self.outcome.as_ref().err()
    }

    /// The page the next attempt continues from: the loaded page on success, `previous` otherwise.
    pub fn position(&self) -> Option<&P> {
        self.page().or(self.previous.as_ref())
    }

    pub fn into_outcome(self) -> Result<P, E> {
        self.outcome
    }
}

impl<P: Page, E> PageResult<P, E> {
    /// `true` if this attempt loaded the last page, i.e. the pager emits nothing after it.
    pub fn is_last(&self) -> bool {
        self.page().is_some_and(|page| !page.has_next_page())
    }
}

/// A ready to use [`Page`] that combines items of the current page with an optional cursor to
/// request the next one. The page is the last one when there is no cursor.
///
/// [`CursorPage::next`] and [`CursorPage::last`] constructors can be used for convenience.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CursorPage<T, C> {
    pub items: Vec<T>,
    pub next_cursor: Option<C>,
}

impl<T, C> CursorPage<T, C> {
    pub fn new(items: Vec<T>, next_cursor: Option<C>) -> Self {
        Self { items, next_cursor }
    }

    pub fn next(items: Vec<T>, next_cursor: C) -> Self {
        Self {
            items,
            next_cursor: Some(next_cursor),
        }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    pub fn cursor(&self) -> Option<&C> {
        self.next_cursor.as_ref()
    }
}

impl<T, C> Page for CursorPage<T, C> {
    type Item = T;

    fn items(&self) -> &[T] {
        &self.items
    }

    fn has_next_page(&self) -> bool {
        self.next_cursor.is_some()
    }
}

mod internal;

#[cfg(test)]
mod test_utils;
