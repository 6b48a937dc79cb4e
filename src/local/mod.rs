//! A pager suitable for singlethreaded executors. Neither providers nor their pages have to be
//! `Send` here.

use crate::internal::{
    request_next_result_decl, PagerState, SinglePage, SourceProvider, SourceTrigger,
};
use futures::{
    future,
    stream::{self, Stream, StreamExt, TryStreamExt},
    TryFutureExt,
};
use std::{
    future::Future,
    ops::{Deref, DerefMut},
};

pub use crate::{CursorPage, Page, PageResult};
#[doc = include_str!("../doc/prelude")]
pub mod prelude {
    pub use super::{
        single_page, CursorPage, Page, PageProvider, PageResult, PageResultOf, PageResultsStream,
    };
}

#[doc = include_str!("../doc/PageOf")]
pub type PageOf<P> = <P as PageProvider>::Page;
#[doc = include_str!("../doc/ErrorOf")]
pub type ErrorOf<P> = <P as PageProvider>::Error;
#[doc = include_str!("../doc/PageLoadResult")]
pub type PageLoadResult<P> = Result<PageOf<P>, ErrorOf<P>>;
#[doc = include_str!("../doc/PageResultOf")]
pub type PageResultOf<P> = PageResult<PageOf<P>, ErrorOf<P>>;

/// This is the less constrained page provider which produces `?Send`(may be Send) futures and
/// streams that should run on single threaded executors.
///
#[doc = include_str!("../doc/PageProvider")]
pub trait PageProvider: Sized {
    type Page: Page + Clone;
    type Error;
    type Trigger: Stream<Item = ()>;

    #[doc = include_str!("../doc/PageProvider__load_next_page")]
    fn load_next_page(&self, after: Option<Self::Page>)
        -> impl Future<Output = PageLoadResult<Self>>;

    #[doc = include_str!("../doc/PageProvider__trigger")]
    fn trigger(&mut self) -> Self::Trigger;

    #[doc = include_str!("../doc/PageProvider__into_pages")]
    fn into_pages(self) -> impl Stream<Item = PageResultOf<Self>> {
        let mut provider = self;
        let trigger = provider.trigger();

        stream::unfold(PagerState::new(provider, trigger), request_next_result)
    }

    #[doc = include_str!("../doc/PageProvider__pages")]
    fn pages(&mut self) -> impl Stream<Item = PageResultOf<Self>> {
        PageProvider::into_pages(self)
    }
}

impl<D, P> PageProvider for D
where
    D: DerefMut<Target = P>,
    P: PageProvider,
{
    type Page = PageOf<P>;
    type Error = ErrorOf<P>;
    type Trigger = P::Trigger;

    async fn load_next_page(&self, after: Option<Self::Page>) -> PageLoadResult<Self> {
        self.deref().load_next_page(after).await
    }

    fn trigger(&mut self) -> Self::Trigger {
        self.deref_mut().trigger()
    }
}

#[doc = include_str!("../doc/PageResultsStream")]
pub trait PageResultsStream<P, E>: Sized + Stream<Item = PageResult<P, E>> {
    #[doc = include_str!("../doc/PageResultsStream__outcomes")]
    fn outcomes(self) -> impl Stream<Item = Result<P, E>>;

    #[doc = include_str!("../doc/PageResultsStream__items")]
    fn items(self) -> impl Stream<Item = Result<P::Item, E>>
    where
        P: Page,
        P::Item: Clone;

    #[doc = include_str!("../doc/PageResultsStream__until_failure")]
    fn until_failure(self) -> impl Stream<Item = Result<P, E>>;
}

impl<S, P, E> PageResultsStream<P, E> for S
where
    S: Stream<Item = PageResult<P, E>>,
{
    fn outcomes(self) -> impl Stream<Item = Result<P, E>> {
        self.map(PageResult::into_outcome)
    }

    fn items(self) -> impl Stream<Item = Result<P::Item, E>>
    where
        P: Page,
        P::Item: Clone,
    {
        self.outcomes()
            .map_ok(|page| stream::iter(page.items().to_vec().into_iter().map(Ok)))
            .try_flatten()
    }

    fn until_failure(self) -> impl Stream<Item = Result<P, E>> {
        self.scan(false, |failed, result| {
            let next = (!*failed).then(|| {
                *failed = result.is_failure();
                result.into_outcome()
            });

            future::ready(next)
        })
    }
}

#[doc = include_str!("../doc/single_page")]
pub fn single_page<F, Fut, T, V, E>(source: F, trigger: T) -> impl Stream<Item = Result<V, E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<V, E>>,
    T: Stream<Item = ()>,
    V: Clone,
{
    PageProvider::into_pages(SourceProvider::new(source, trigger))
        .map(|result| result.outcome.map(SinglePage::into_value))
}

impl<F, Fut, T, V, E> PageProvider for SourceProvider<F, T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<V, E>>,
    T: Stream<Item = ()>,
    V: Clone,
{
    type Page = SinglePage<V>;
    type Error = E;
    type Trigger = SourceTrigger<T>;

    fn load_next_page(
        &self,
        _after: Option<Self::Page>,
    ) -> impl Future<Output = PageLoadResult<Self>> {
        (self.source)().map_ok(SinglePage::new)
    }

    fn trigger(&mut self) -> Self::Trigger {
        self.take_trigger()
    }
}

request_next_result_decl!(<P as PageProvider>::Trigger;);
