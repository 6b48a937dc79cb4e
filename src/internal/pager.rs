//! Helpers to implement the pager.
//!
//! The pager is a `stream::unfold` over a single owned [`PagerState`]. Every call of the step
//! function generated by [`request_next_result_decl`] performs exactly one attempt: it waits for a
//! trigger if the previous attempt asked for one, loads one page while ignoring triggers and emits
//! the resulting `PageResult` together with the state for the next step.
use crate::{Page, PageResult};
use futures::{
    future::{self, Either},
    stream::{Fuse, Stream, StreamExt},
    FutureExt,
};
use std::{convert::Infallible, future::Future, pin::Pin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingLoad,
    AwaitingTrigger,
    Terminated,
}

pub struct PagerState<P, T, Pg> {
    pub provider: P,
    pub trigger: Pin<Box<Fuse<T>>>,
    pub position: Option<Pg>,
    pub phase: Phase,
    pub attempt: u64,
}

impl<P, T, Pg> PagerState<P, T, Pg>
where
    T: Stream<Item = ()>,
{
    pub fn new(provider: P, trigger: T) -> Self {
        Self {
            provider,
            trigger: Box::pin(trigger.fuse()),
            position: None,
            phase: Phase::AwaitingLoad,
            attempt: 0,
        }
    }

    /// Waits for the next trigger. If the trigger stream has ended, no attempt can ever start
    /// again, so this never resolves and the pager stays pending until it's dropped.
    pub async fn wait_for_trigger(&mut self) {
        if self.trigger.next().await.is_none() {
            tracing::debug!(
                attempt = self.attempt,
                "trigger stream ended, pager waits until dropped"
            );

            future::pending::<()>().await;
        }
    }

    pub fn begin_attempt(&mut self) -> Option<Pg>
    where
        Pg: Clone,
    {
        self.attempt += 1;
        tracing::debug!(
            attempt = self.attempt,
            has_previous = self.position.is_some(),
            "loading page"
        );

        self.position.clone()
    }

    /// Records the outcome of the current attempt and decides what the next step does.
    pub fn complete_attempt<E>(
        &mut self,
        previous: Option<Pg>,
        outcome: Result<Pg, E>,
    ) -> PageResult<Pg, E>
    where
        Pg: Page + Clone,
    {
        match &outcome {
            Ok(page) if !page.has_next_page() => {
                tracing::debug!(attempt = self.attempt, "last page loaded");
                self.phase = Phase::Terminated;
            }
            Ok(page) => {
                self.position = Some(page.clone());
                self.phase = Phase::AwaitingTrigger;
            }
            Err(_) => {
                tracing::debug!(
                    attempt = self.attempt,
                    "page load failed, retrying on the next trigger"
                );
                self.phase = Phase::AwaitingTrigger;
            }
        }

        PageResult::new(previous, outcome)
    }
}

/// Drives `load` to completion while swallowing every trigger that arrives in the meantime,
/// including the ones that are already queued when `load` resolves.
pub async fn ignore_triggers_while<F, T>(load: F, trigger: &mut Pin<Box<Fuse<T>>>) -> F::Output
where
    F: Future,
    T: Stream<Item = ()>,
{
    let output = {
        let ignore = async {
            while trigger.next().await.is_some() {
                tracing::trace!("trigger ignored, page load is in flight");
            }

            future::pending::<Infallible>().await
        };

        match future::select(std::pin::pin!(load), std::pin::pin!(ignore)).await {
            Either::Left((output, _)) => output,
            Either::Right((never, _)) => match never {},
        }
    };

    while let Some(Some(())) = trigger.next().now_or_never() {
        tracing::trace!("trigger ignored, arrived before the page load resolved");
    }

    output
}

macro_rules! request_next_result_decl {
    ($trigger:ty; $($extra_bounds:tt)*) => {
        async fn request_next_result<P>(
            mut state: crate::internal::pager::PagerState<P, $trigger, PageOf<P>>,
        ) -> Option<(
            PageResultOf<P>,
            crate::internal::pager::PagerState<P, $trigger, PageOf<P>>,
        )>
        where
            P: PageProvider,
            $($extra_bounds)*
        {
            use crate::internal::pager::{ignore_triggers_while, Phase};

            match state.phase {
                Phase::Terminated => return None,
                Phase::AwaitingTrigger => state.wait_for_trigger().await,
                Phase::AwaitingLoad => {}
            }

            let previous = state.begin_attempt();
            let load = state.provider.load_next_page(previous.clone());
            let outcome = ignore_triggers_while(load, &mut state.trigger).await;

            let result = state.complete_attempt(previous, outcome);
            Some((result, state))
        }
    };
}

pub(crate) use request_next_result_decl;
