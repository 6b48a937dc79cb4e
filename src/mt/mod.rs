//! A pager suitable for multithreaded executors. This is what you need in most cases. See
//! [`dynamic`] if you also need `dyn PageProvider` objects for some reason.

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

/// A page provider suitable for use in multithreaded contexts
///
#[doc = include_str!("../doc/PageProvider")]
pub trait PageProvider: Send + Sync {
    type Page: Page + Clone + Send;
    type Error: Send;
    type Trigger: Send + Stream<Item = ()>;

    #[doc = include_str!("../doc/PageProvider__load_next_page")]
    fn load_next_page(
        &self,
        after: Option<Self::Page>,
    ) -> impl Send + Future<Output = PageLoadResult<Self>>;

    #[doc = include_str!("../doc/PageProvider__trigger")]
    fn trigger(&mut self) -> Self::Trigger;

    #[doc = include_str!("../doc/PageProvider__into_pages")]
    fn into_pages(self) -> impl Send + Stream<Item = PageResultOf<Self>>
    where
        Self: Sized,
    {
        let mut provider = self;
        let trigger = provider.trigger();

        stream::unfold(PagerState::new(provider, trigger), request_next_result)
    }

    #[doc = include_str!("../doc/PageProvider__pages")]
    fn pages(&mut self) -> impl Send + Stream<Item = PageResultOf<Self>>
    where
        Self: Sized,
    {
        PageProvider::into_pages(self)
    }
}

impl<D, P> PageProvider for D
where
    D: Send + Sync + DerefMut<Target = P>,
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
pub trait PageResultsStream<P, E>: Sized + Send + Stream<Item = PageResult<P, E>>
where
    P: Send,
    E: Send,
{
    #[doc = include_str!("../doc/PageResultsStream__outcomes")]
    fn outcomes(self) -> impl Send + Stream<Item = Result<P, E>>;

    #[doc = include_str!("../doc/PageResultsStream__items")]
    fn items(self) -> impl Send + Stream<Item = Result<P::Item, E>>
    where
        P: Page,
        P::Item: Clone + Send;

    #[doc = include_str!("../doc/PageResultsStream__until_failure")]
    fn until_failure(self) -> impl Send + Stream<Item = Result<P, E>>;
}

impl<S, P, E> PageResultsStream<P, E> for S
where
    P: Send,
    E: Send,
    S: Send + Stream<Item = PageResult<P, E>>,
{
    fn outcomes(self) -> impl Send + Stream<Item = Result<P, E>> {
        self.map(PageResult::into_outcome)
    }

    fn items(self) -> impl Send + Stream<Item = Result<P::Item, E>>
    where
        P: Page,
        P::Item: Clone + Send,
    {
        self.outcomes()
            .map_ok(|page| stream::iter(page.items().to_vec().into_iter().map(Ok)))
            .try_flatten()
    }

    fn until_failure(self) -> impl Send + Stream<Item = Result<P, E>> {
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
pub fn single_page<F, Fut, T, V, E>(
    source: F,
    trigger: T,
) -> impl Send + Stream<Item = Result<V, E>>
where
    F: Send + Sync + Fn() -> Fut,
    Fut: Send + Future<Output = Result<V, E>>,
    T: Send + Stream<Item = ()>,
    V: Clone + Send,
    E: Send,
{
    PageProvider::into_pages(SourceProvider::new(source, trigger))
        .map(|result| result.outcome.map(SinglePage::into_value))
}

impl<F, Fut, T, V, E> PageProvider for SourceProvider<F, T>
where
    F: Send + Sync + Fn() -> Fut,
    Fut: Send + Future<Output = Result<V, E>>,
    T: Send + Stream<Item = ()>,
    V: Clone + Send,
    E: Send,
{
    type Page = SinglePage<V>;
    type Error = E;
    type Trigger = SourceTrigger<T>;

    fn load_next_page(
        &self,
        _after: Option<Self::Page>,
    ) -> impl Send + Future<Output = PageLoadResult<Self>> {
        (self.source)().map_ok(SinglePage::new)
    }

    fn trigger(&mut self) -> Self::Trigger {
        self.take_trigger()
    }
}

request_next_result_decl!(<P as PageProvider>::Trigger;);

#[cfg(feature = "dynamic")]
#[cfg_attr(docsrs, doc(cfg(feature = "dynamic")))]
pub mod dynamic {
    //! A page provider that can be used as a `dyn` object and which yields concrete boxed types

    use crate::internal::{request_next_result_decl, PagerState};
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream, Stream, StreamExt};
    use std::ops::{Deref, DerefMut};

    pub use super::PageResultsStream;
    pub use crate::{CursorPage, Page, PageResult};
    #[doc = include_str!("../doc/prelude")]
    pub mod prelude {
        pub use super::{
            BoxedPageResults, CursorPage, Page, PageProvider, PageResult, PageResultOf,
            PageResultsStream,
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

    /// A page provider which yields dynamic objects. All methods are object safe and can be used
    /// with dynamic dispatch. Requires `#[async_trait]` to be implemented
    ///
    #[doc = include_str!("../doc/PageProvider")]
    #[async_trait]
    pub trait PageProvider: Send + Sync {
        type Page: 'static + Page + Clone + Send;
        type Error: 'static + Send;

        #[doc = include_str!("../doc/PageProvider__load_next_page")]
        async fn load_next_page(&self, after: Option<Self::Page>) -> PageLoadResult<Self>;

        #[doc = include_str!("../doc/PageProvider__trigger")]
        fn trigger(&mut self) -> BoxStream<'static, ()>;

        #[doc = include_str!("../doc/PageProvider__pages")]
        fn pages(&mut self) -> BoxedPageResults<'_, Self::Page, Self::Error> {
            let trigger = self.trigger();

            BoxedPageResults(
                stream::unfold(PagerState::new(self, trigger), request_next_result).boxed(),
            )
        }

        #[doc = include_str!("../doc/PageProvider__into_pages")]
        fn into_pages<'s>(self) -> BoxedPageResults<'s, Self::Page, Self::Error>
        where
            Self: 's + Sized,
        {
            let mut provider = self;
            let trigger = provider.trigger();

            BoxedPageResults(
                stream::unfold(PagerState::new(provider, trigger), request_next_result).boxed(),
            )
        }
    }

    #[async_trait]
    impl<D, P> PageProvider for D
    where
        D: Send + Sync + DerefMut<Target = P>,
        P: ?Sized + PageProvider,
    {
        type Page = PageOf<P>;
        type Error = ErrorOf<P>;

        async fn load_next_page(&self, after: Option<Self::Page>) -> PageLoadResult<Self> {
            self.deref().load_next_page(after).await
        }

        fn trigger(&mut self) -> BoxStream<'static, ()> {
            self.deref_mut().trigger()
        }
    }

    /// A boxed stream of page results to satisfy object safety requirements of [`PageProvider`]
    pub struct BoxedPageResults<'a, P, E>(BoxStream<'a, PageResult<P, E>>);

    impl<'a, P, E> Stream for BoxedPageResults<'a, P, E> {
        type Item = PageResult<P, E>;

        fn poll_next(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Self::Item>> {
            self.0.poll_next_unpin(cx)
        }

        fn size_hint(&self) -> (usize, Option<usize>) {
            self.0.size_hint()
        }
    }

    request_next_result_decl!(BoxStream<'static, ()>;);
}
