use crate::{single_shot::first_output, Page, SingleShotError};
use futures::stream::{self, BoxStream, StreamExt};
use std::{
    future::Future,
    ops::Range,
    sync::{Arc, Mutex},
};
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TestError {
    #[error("one")]
    One,
    #[error("two")]
    Two,
}

/// A page of consecutive numbers. There are 50 numbers in total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPage {
    pub items: Vec<usize>,
    pub next_offset: usize,
}

impl TestPage {
    pub const TOTAL: usize = 50;

    pub fn new(range: Range<usize>) -> Self {
        Self {
            next_offset: range.end,
            items: range.collect(),
        }
    }

    pub fn make(count: usize, length: usize) -> Vec<Self> {
        (0..count)
            .map(|page| {
                let start = page * length;
                Self::new(start..start + length)
            })
            .collect()
    }
}

impl Page for TestPage {
    type Item = usize;

    fn items(&self) -> &[usize] {
        &self.items
    }

    fn has_next_page(&self) -> bool {
        self.next_offset < Self::TOTAL
    }
}

/// Turns a broadcast subscription into a stream. Like a subject, the stream only sees values sent
/// after the subscription was made.
pub fn broadcast_stream<T>(rx: broadcast::Receiver<T>) -> BoxStream<'static, T>
where
    T: 'static + Clone + Send,
{
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(value) => return Some((value, rx)),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

/// A provider that loads whatever page is published through its [`Remote`] while a load is in
/// flight. Pages published while nothing is loading are lost.
pub struct TestProvider {
    pages: broadcast::Sender<Result<TestPage, TestError>>,
    triggers: broadcast::Sender<()>,
    loads: Arc<Mutex<Vec<Option<TestPage>>>>,
}

#[derive(Clone)]
pub struct Remote {
    pages: broadcast::Sender<Result<TestPage, TestError>>,
    triggers: broadcast::Sender<()>,
    loads: Arc<Mutex<Vec<Option<TestPage>>>>,
}

impl TestProvider {
    pub fn new() -> (Self, Remote) {
        let (pages, _) = broadcast::channel(16);
        let (triggers, _) = broadcast::channel(16);
        let loads = Arc::new(Mutex::new(Vec::new()));

        let remote = Remote {
            pages: pages.clone(),
            triggers: triggers.clone(),
            loads: Arc::clone(&loads),
        };

        (
            Self {
                pages,
                triggers,
                loads,
            },
            remote,
        )
    }

    pub fn load(
        &self,
        after: Option<TestPage>,
    ) -> impl 'static + Send + Future<Output = Result<TestPage, SingleShotError<TestError>>> {
        self.loads.lock().unwrap().push(after);
        first_output(broadcast_stream(self.pages.subscribe()))
    }

    pub fn subscribe_trigger(&self) -> BoxStream<'static, ()> {
        broadcast_stream(self.triggers.subscribe())
    }
}

impl Remote {
    pub fn send(&self, page: &TestPage) {
        let _ = self.pages.send(Ok(page.clone()));
    }

    pub fn fail(&self, err: TestError) {
        let _ = self.pages.send(Err(err));
    }

    /// Sends a trigger.
    pub fn pull(&self) {
        let _ = self.triggers.send(());
    }

    /// The `after` argument of every page load requested so far.
    pub fn loads(&self) -> Vec<Option<TestPage>> {
        self.loads.lock().unwrap().clone()
    }

    /// Number of page loads currently waiting for a page.
    pub fn loads_in_flight(&self) -> usize {
        self.pages.receiver_count()
    }

    pub fn trigger_subscribers(&self) -> usize {
        self.triggers.receiver_count()
    }
}

macro_rules! test_provider_impl {
    (@types) => {
        type Page = TestPage;
        type Error = SingleShotError<TestError>;
    };
    (async_trait) => {
        #[async_trait::async_trait]
        impl PageProvider for TestProvider {
            test_provider_impl!(@types);

            async fn load_next_page(
                &self,
                after: Option<TestPage>,
            ) -> PageLoadResult<Self> {
                self.load(after).await
            }

            fn trigger(&mut self) -> futures::stream::BoxStream<'static, ()> {
                self.subscribe_trigger()
            }
        }
    };
    () => {
        impl PageProvider for TestProvider {
            test_provider_impl!(@types);
            type Trigger = futures::stream::BoxStream<'static, ()>;

            async fn load_next_page(
                &self,
                after: Option<TestPage>,
            ) -> PageLoadResult<Self> {
                self.load(after).await
            }

            fn trigger(&mut self) -> Self::Trigger {
                self.subscribe_trigger()
            }
        }
    };
}

macro_rules! pager_tests {
    ($flavor:tt) => {
        #[tokio::test(flavor = $flavor)]
        async fn completes_with_single_page() {
            let (provider, remote) = TestProvider::new();
            let mut results = std::pin::pin!(provider.into_pages());
            assert!(futures::poll!(results.next()).is_pending());

            let page = TestPage::new(0..50);
            remote.send(&page);

            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(PageResult::success(None, page))),
            );
            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(None),
                "a page without a next page finishes paging without waiting for a trigger"
            );
            assert_eq!(remote.loads(), vec![None]);
        }

        #[tokio::test(flavor = $flavor)]
        async fn completes_with_multiple_pages() {
            let (provider, remote) = TestProvider::new();
            let mut results = std::pin::pin!(provider.into_pages());
            let pages = TestPage::make(5, 10);

            for (idx, page) in pages.iter().enumerate() {
                assert!(futures::poll!(results.next()).is_pending());
                remote.send(page);

                let previous = idx.checked_sub(1).map(|prev| pages[prev].clone());
                assert_eq!(
                    futures::poll!(results.next()),
                    Poll::Ready(Some(PageResult::success(previous, page.clone()))),
                    "page {idx}"
                );

                if idx + 1 < pages.len() {
                    assert!(
                        futures::poll!(results.next()).is_pending(),
                        "the next page is loaded only after a trigger"
                    );
                    remote.pull();
                }
            }

            assert_eq!(futures::poll!(results.next()), Poll::Ready(None));

            let expected_loads: Vec<_> = std::iter::once(None)
                .chain(pages[..4].iter().cloned().map(Some))
                .collect();
            assert_eq!(remote.loads(), expected_loads);
        }

        #[tokio::test(flavor = $flavor)]
        async fn failure_is_retried_by_next_trigger() {
            let (provider, remote) = TestProvider::new();
            let mut results = std::pin::pin!(provider.into_pages());
            assert!(futures::poll!(results.next()).is_pending());

            remote.fail(TestError::One);
            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(PageResult::failure(
                    None,
                    SingleShotError::Failed(TestError::One)
                ))),
            );
            assert!(futures::poll!(results.next()).is_pending());

            remote.pull();
            assert!(futures::poll!(results.next()).is_pending());

            let page = TestPage::new(0..10);
            remote.send(&page);
            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(PageResult::success(None, page))),
            );
            assert_eq!(remote.loads(), vec![None, None]);
        }

        #[tokio::test(flavor = $flavor)]
        async fn failure_keeps_position() {
            let (provider, remote) = TestProvider::new();
            let mut results = std::pin::pin!(provider.into_pages());
            let pages = TestPage::make(2, 10);

            assert!(futures::poll!(results.next()).is_pending());
            remote.send(&pages[0]);
            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(PageResult::success(None, pages[0].clone()))),
            );

            assert!(futures::poll!(results.next()).is_pending());
            remote.pull();
            assert!(futures::poll!(results.next()).is_pending());
            remote.fail(TestError::Two);
            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(PageResult::failure(
                    Some(pages[0].clone()),
                    SingleShotError::Failed(TestError::Two)
                ))),
            );

            assert!(futures::poll!(results.next()).is_pending());
            remote.pull();
            assert!(futures::poll!(results.next()).is_pending());
            remote.send(&pages[1]);
            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(PageResult::success(
                    Some(pages[0].clone()),
                    pages[1].clone()
                ))),
                "a retry continues from the last successful page"
            );

            assert_eq!(
                remote.loads(),
                vec![None, Some(pages[0].clone()), Some(pages[0].clone())]
            );
        }

        #[tokio::test(flavor = $flavor)]
        async fn multiple_page_outputs_ignored() {
            let (provider, remote) = TestProvider::new();
            let mut results = std::pin::pin!(provider.into_pages());
            let pages = TestPage::make(5, 10);

            assert!(futures::poll!(results.next()).is_pending());
            for page in &pages {
                remote.send(page);
            }

            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(PageResult::success(None, pages[0].clone()))),
            );
            assert!(futures::poll!(results.next()).is_pending());
            assert_eq!(remote.loads().len(), 1);
            assert_eq!(remote.loads_in_flight(), 0);
        }

        #[tokio::test(flavor = $flavor)]
        async fn page_output_before_trigger_ignored() {
            let (provider, remote) = TestProvider::new();
            let mut results = std::pin::pin!(provider.into_pages());
            let pages = TestPage::make(5, 10);

            assert!(futures::poll!(results.next()).is_pending());
            remote.send(&pages[0]);
            let expected = PageResult::success(None, pages[0].clone());
            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(expected))
            );

            for page in &pages[1..4] {
                remote.send(page);
            }
            assert!(futures::poll!(results.next()).is_pending());

            remote.pull();
            assert!(futures::poll!(results.next()).is_pending());

            remote.send(&pages[4]);
            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(PageResult::success(
                    Some(pages[0].clone()),
                    pages[4].clone()
                ))),
            );
            assert_eq!(futures::poll!(results.next()), Poll::Ready(None));
        }

        #[tokio::test(flavor = $flavor)]
        async fn ignores_triggers_while_loading_page() {
            let (provider, remote) = TestProvider::new();
            let mut results = std::pin::pin!(provider.into_pages());
            let pages = TestPage::make(3, 10);

            assert!(futures::poll!(results.next()).is_pending());
            remote.send(&pages[0]);
            assert!(futures::poll!(results.next()).is_ready());

            remote.pull();
            assert!(futures::poll!(results.next()).is_pending());
            assert_eq!(remote.loads_in_flight(), 1);

            remote.pull();
            remote.pull();
            remote.pull();
            assert!(futures::poll!(results.next()).is_pending());

            remote.send(&pages[1]);
            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(PageResult::success(
                    Some(pages[0].clone()),
                    pages[1].clone()
                ))),
            );

            assert!(
                futures::poll!(results.next()).is_pending(),
                "triggers sent during a load must not start another one"
            );
            assert_eq!(remote.loads().len(), 2);
            assert_eq!(remote.loads_in_flight(), 0);

            remote.pull();
            assert!(futures::poll!(results.next()).is_pending());
            assert_eq!(remote.loads().len(), 3);
        }

        #[tokio::test(flavor = $flavor)]
        async fn triggers_queued_during_load_are_dropped() {
            let (provider, remote) = TestProvider::new();
            let mut results = std::pin::pin!(provider.into_pages());
            let pages = TestPage::make(2, 10);

            assert!(futures::poll!(results.next()).is_pending());

            // The pager isn't polled between these, so it sees the triggers only once the page
            // is already there
            remote.pull();
            remote.pull();
            remote.send(&pages[0]);

            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(PageResult::success(None, pages[0].clone()))),
            );
            assert!(futures::poll!(results.next()).is_pending());
            assert_eq!(remote.loads().len(), 1);
        }

        #[tokio::test(flavor = $flavor)]
        async fn restart_reproduces_first_result() {
            let (mut provider, remote) = TestProvider::new();
            let page = TestPage::new(0..10);

            let first = {
                let mut results = std::pin::pin!(provider.pages());
                assert!(futures::poll!(results.next()).is_pending());
                remote.send(&page);
                futures::poll!(results.next())
            };

            let second = {
                let mut results = std::pin::pin!(provider.pages());
                assert!(futures::poll!(results.next()).is_pending());
                remote.send(&page);
                futures::poll!(results.next())
            };

            assert_eq!(first, Poll::Ready(Some(PageResult::success(None, page))));
            assert_eq!(first, second);
            assert_eq!(remote.loads(), vec![None, None]);
        }

        #[tokio::test(flavor = $flavor)]
        async fn cancellation_releases_everything() {
            let (mut provider, remote) = TestProvider::new();

            {
                let mut results = std::pin::pin!(provider.pages());
                assert!(futures::poll!(results.next()).is_pending());
                assert_eq!(remote.loads_in_flight(), 1);
                assert_eq!(remote.trigger_subscribers(), 1);
            }

            assert_eq!(remote.loads_in_flight(), 0, "the page load must be cancelled");
            assert_eq!(remote.trigger_subscribers(), 0, "the trigger wait must be cancelled");

            let page = TestPage::new(0..10);
            let mut results = std::pin::pin!(provider.pages());
            assert!(futures::poll!(results.next()).is_pending());
            remote.send(&page);
            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(PageResult::success(None, page))),
            );
        }

        #[tokio::test(flavor = $flavor)]
        async fn results_stream_adapters() {
            let pages = TestPage::make(2, 3);
            let results = vec![
                PageResult::success(None, pages[0].clone()),
                PageResult::failure(Some(pages[0].clone()), TestError::One),
                PageResult::success(Some(pages[0].clone()), pages[1].clone()),
            ];

            let items: Vec<_> = futures::stream::iter(results.clone())
                .items()
                .collect()
                .await;
            assert_eq!(
                items,
                vec![Ok(0), Ok(1), Ok(2), Err(TestError::One), Ok(3), Ok(4), Ok(5)]
            );

            let outcomes: Vec<_> = futures::stream::iter(results.clone())
                .outcomes()
                .collect()
                .await;
            assert_eq!(
                outcomes,
                vec![Ok(pages[0].clone()), Err(TestError::One), Ok(pages[1].clone())]
            );

            let until_failure: Vec<_> = futures::stream::iter(results)
                .until_failure()
                .collect()
                .await;
            assert_eq!(
                until_failure,
                vec![Ok(pages[0].clone()), Err(TestError::One)],
                "the stream must end right after the first failure"
            );
        }
    };
}

macro_rules! single_page_tests {
    ($flavor:tt) => {
        #[tokio::test(flavor = $flavor)]
        async fn single_page_retries_until_success() {
            use std::sync::atomic::{AtomicUsize, Ordering};

            let calls = std::sync::Arc::new(AtomicUsize::new(0));
            let source = {
                let calls = std::sync::Arc::clone(&calls);
                move || {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 2 {
                            Err(TestError::One)
                        } else {
                            Ok(attempt)
                        }
                    }
                }
            };

            let (trigger, triggers) = futures::channel::mpsc::unbounded();
            let mut results = std::pin::pin!(single_page(source, triggers));

            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(Err(TestError::One)))
            );
            assert!(futures::poll!(results.next()).is_pending());

            trigger.unbounded_send(()).unwrap();
            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(Err(TestError::One)))
            );

            trigger.unbounded_send(()).unwrap();
            assert_eq!(futures::poll!(results.next()), Poll::Ready(Some(Ok(2))));

            trigger.unbounded_send(()).unwrap();
            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(None),
                "nothing is loaded after a success"
            );
            assert_eq!(calls.load(Ordering::SeqCst), 3);
        }

        #[tokio::test(flavor = $flavor)]
        async fn single_page_succeeds_without_trigger() {
            let source = || async { Ok::<_, TestError>("value") };
            let mut results = std::pin::pin!(single_page(source, futures::stream::pending()));

            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(Ok("value")))
            );
            assert_eq!(futures::poll!(results.next()), Poll::Ready(None));
        }

        #[tokio::test(flavor = $flavor)]
        async fn single_page_stays_pending_after_trigger_ends() {
            let source = || async { Err::<u8, _>(TestError::Two) };
            let (trigger, triggers) = futures::channel::mpsc::unbounded();
            let mut results = std::pin::pin!(single_page(source, triggers));

            assert_eq!(
                futures::poll!(results.next()),
                Poll::Ready(Some(Err(TestError::Two)))
            );
            assert!(futures::poll!(results.next()).is_pending());

            drop(trigger);
            for _ in 0..3 {
                assert!(
                    futures::poll!(results.next()).is_pending(),
                    "the pager neither retries nor finishes without a trigger"
                );
            }
        }
    };
}

pub(crate) use pager_tests;
pub(crate) use single_page_tests;
pub(crate) use test_provider_impl;
