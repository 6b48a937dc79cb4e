//! Single-flight gating of streams.
//!
//! [`SingleFlightExt::single_flight`] maps elements of an upstream stream into inner streams like
//! `flat_map` does, except that only one inner stream may be active at a time. Elements that
//! arrive while an inner stream is active are dropped without buffering. The pager applies the
//! same policy to its triggers. The gate is meant for everything that isn't a page, e.g. mapping
//! a stream of refresh signals into requests.
//!
//! [`TrySingleFlightExt::try_single_flight`] is the fallible flavour: the first error coming from
//! the upstream or from the active inner stream is forwarded and ends the output stream.
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
    /// Stream for the [`single_flight`](SingleFlightExt::single_flight) method.
    #[must_use = "streams do nothing unless polled"]
    pub struct SingleFlight<St, F, Inner> {
        #[pin]
        upstream: Fuse<St>,
        #[pin]
        in_flight: Option<Inner>,
        f: F,
    }
}

impl<St, F, Inner> SingleFlight<St, F, Inner>
where
    St: Stream,
    F: FnMut(St::Item) -> Inner,
    Inner: Stream,
{
    fn new(upstream: St, f: F) -> Self {
        Self {
            upstream: upstream.fuse(),
            in_flight: None,
            f,
        }
    }
}

impl<St, F, Inner> SingleFlight<St, F, Inner> {
    /// Whether an inner stream is active, i.e. it hasn't been observed to end yet.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }
}

fn drop_while_busy<St: Stream>(mut upstream: Pin<&mut Fuse<St>>, cx: &mut Context<'_>) {
    while let Poll::Ready(Some(_)) = upstream.as_mut().poll_next(cx) {
        tracing::trace!("single flight is busy, upstream element dropped");
    }
}

impl<St, F, Inner> Stream for SingleFlight<St, F, Inner>
where
    St: Stream,
    F: FnMut(St::Item) -> Inner,
    Inner: Stream,
{
    type Item = Inner::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(inner) = this.in_flight.as_mut().as_pin_mut() {
                let poll = inner.poll_next(cx);
                if let Poll::Ready(None) = poll {
                    this.in_flight.set(None);
                    continue;
                }

                drop_while_busy(this.upstream.as_mut(), cx);
                return poll;
            }

            match ready!(this.upstream.as_mut().poll_next(cx)) {
                Some(element) => this.in_flight.set(Some((this.f)(element))),
                None => return Poll::Ready(None),
            }
        }
    }
}

impl<St, F, Inner> FusedStream for SingleFlight<St, F, Inner>
where
    St: Stream,
    F: FnMut(St::Item) -> Inner,
    Inner: Stream,
{
    fn is_terminated(&self) -> bool {
        self.in_flight.is_none() && self.upstream.is_done()
    }
}

pin_project! {
    /// Stream for the [`try_single_flight`](TrySingleFlightExt::try_single_flight) method.
    #[must_use = "streams do nothing unless polled"]
    pub struct TrySingleFlight<St, F, Inner>
    where
        St: TryStream,
    {
        #[pin]
        upstream: St,
        upstream_done: bool,
        #[pin]
        in_flight: Option<Inner>,
        f: F,
        // An upstream error seen while an inner element was being emitted
        queued_error: Option<St::Error>,
        terminated: bool,
    }
}

impl<St, F, Inner> TrySingleFlight<St, F, Inner>
where
    St: TryStream,
    F: FnMut(St::Ok) -> Inner,
    Inner: TryStream<Error = St::Error>,
{
    fn new(upstream: St, f: F) -> Self {
        Self {
            upstream,
            upstream_done: false,
            in_flight: None,
            f,
            queued_error: None,
            terminated: false,
        }
    }
}

impl<St, F, Inner> TrySingleFlight<St, F, Inner>
where
    St: TryStream,
{
    /// Whether an inner stream is active, i.e. it hasn't been observed to end yet.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }
}

/// Drops ready upstream elements and returns the first upstream error, if any.
fn try_drop_while_busy<St: TryStream>(
    mut upstream: Pin<&mut St>,
    upstream_done: &mut bool,
    cx: &mut Context<'_>,
) -> Option<St::Error> {
    while !*upstream_done {
        match upstream.as_mut().try_poll_next(cx) {
            Poll::Ready(Some(Ok(_))) => {
                tracing::trace!("single flight is busy, upstream element dropped")
            }
            Poll::Ready(Some(Err(err))) => return Some(err),
            Poll::Ready(None) => *upstream_done = true,
            Poll::Pending => break,
        }
    }

    None
}

impl<St, F, Inner> Stream for TrySingleFlight<St, F, Inner>
where
    St: TryStream,
    F: FnMut(St::Ok) -> Inner,
    Inner: TryStream<Error = St::Error>,
{
    type Item = Result<Inner::Ok, St::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if *this.terminated {
            return Poll::Ready(None);
        }

        if let Some(err) = this.queued_error.take() {
            *this.terminated = true;
            this.in_flight.set(None);
            return Poll::Ready(Some(Err(err)));
        }

        loop {
            if let Some(inner) = this.in_flight.as_mut().as_pin_mut() {
                match inner.try_poll_next(cx) {
                    Poll::Ready(None) => {
                        this.in_flight.set(None);
                        continue;
                    }
                    Poll::Ready(Some(Err(err))) => {
                        *this.terminated = true;
                        this.in_flight.set(None);
                        return Poll::Ready(Some(Err(err)));
                    }
                    Poll::Ready(Some(Ok(item))) => {
                        *this.queued_error =
                            try_drop_while_busy(this.upstream.as_mut(), this.upstream_done, cx);
                        return Poll::Ready(Some(Ok(item)));
                    }
                    Poll::Pending => {
                        let Some(err) =
                            try_drop_while_busy(this.upstream.as_mut(), this.upstream_done, cx)
                        else {
                            return Poll::Pending;
                        };

                        *this.terminated = true;
                        this.in_flight.set(None);
                        return Poll::Ready(Some(Err(err)));
                    }
                }
            }

            if *this.upstream_done {
                *this.terminated = true;
                return Poll::Ready(None);
            }

            match ready!(this.upstream.as_mut().try_poll_next(cx)) {
                Some(Ok(element)) => this.in_flight.set(Some((this.f)(element))),
                Some(Err(err)) => {
                    *this.terminated = true;
                    return Poll::Ready(Some(Err(err)));
                }
                None => *this.upstream_done = true,
            }
        }
    }
}

impl<St, F, Inner> FusedStream for TrySingleFlight<St, F, Inner>
where
    St: TryStream,
    F: FnMut(St::Ok) -> Inner,
    Inner: TryStream<Error = St::Error>,
{
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

/// Extension trait providing the single-flight gate for any stream.
pub trait SingleFlightExt: Stream {
    /// Maps each element into an inner stream and flattens it, starting a new inner stream only
    /// when the previous one has finished. Elements arriving while an inner stream is active are
    /// dropped.
    ///
    /// The output ends once the upstream has ended and the last inner stream has finished.
    /// Dropping the output cancels the active inner stream.
    fn single_flight<F, Inner>(self, f: F) -> SingleFlight<Self, F, Inner>
    where
        Self: Sized,
        F: FnMut(Self::Item) -> Inner,
        Inner: Stream,
    {
        SingleFlight::new(self, f)
    }
}

impl<S: Stream + ?Sized> SingleFlightExt for S {}

/// Extension trait providing the fallible single-flight gate for any [`TryStream`].
pub trait TrySingleFlightExt: TryStream {
    /// Same as [`SingleFlightExt::single_flight`] but for fallible streams. Errors of the upstream
    /// and of the active inner stream are forwarded, and the first one ends the output stream.
    fn try_single_flight<F, Inner>(self, f: F) -> TrySingleFlight<Self, F, Inner>
    where
        Self: Sized,
        F: FnMut(Self::Ok) -> Inner,
        Inner: TryStream<Error = Self::Error>,
    {
        TrySingleFlight::new(self, f)
    }
}

impl<S: TryStream + ?Sized> TrySingleFlightExt for S {}
