//! The relay transfer loop.
//!
//! `RelayBody` is polled by the server only when the client connection can
//! take more data, and only then polls upstream. Each poll:
//!
//! ```text
//! deadline passed?      → error (connection is cut)
//! upstream chunk ready? → count it, check cap, forward it
//! upstream ended?       → done
//! pulse due?            → empty frame
//! ```
//!
//! The pulse is a writer wake-up only. hyper writes nothing for an empty data
//! frame, so an idle stream puts no bytes on the wire and the relayed body is
//! exactly the upstream body. Idle connections are kept alive by TCP and by
//! the deadline bounding how long a stream may stay open.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};

use crate::http::request::RequestId;
use crate::observability::metrics;
use crate::resilience::timeouts::DeadlineExceeded;
use crate::security::limits::{BodyLimit, LimitExceeded};
use crate::upstream::{BoxError, UpstreamBody};

/// Why a stream was cut after the response head was sent.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("response body too large: {0}")]
    PayloadTooLarge(#[from] LimitExceeded),

    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),

    #[error("upstream body failed: {0}")]
    Upstream(#[source] BoxError),
}

/// Per-stream transfer accounting.
#[derive(Debug)]
pub struct StreamState {
    pub bytes_streamed: u64,
    pub limit: BodyLimit,
    pub request_id: RequestId,
}

impl StreamState {
    pub fn new(limit: BodyLimit, request_id: RequestId) -> Self {
        Self {
            bytes_streamed: 0,
            limit,
            request_id,
        }
    }
}

/// Size-capped, deadline-bounded upstream body with liveness pulses.
pub struct RelayBody {
    upstream: UpstreamBody,
    state: StreamState,
    pulse: Interval,
    deadline: Pin<Box<Sleep>>,
    started: Instant,
    finished: bool,
}

impl RelayBody {
    pub fn new(
        upstream: UpstreamBody,
        state: StreamState,
        keepalive: Duration,
        started: Instant,
        deadline: Instant,
    ) -> Self {
        let mut pulse = tokio::time::interval_at(Instant::now() + keepalive, keepalive);
        pulse.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            upstream,
            state,
            pulse,
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
            started,
            finished: false,
        }
    }

    pub fn bytes_streamed(&self) -> u64 {
        self.state.bytes_streamed
    }

    fn finish(&mut self, outcome: &'static str) {
        self.finished = true;
        let elapsed = self.started.elapsed();
        metrics::record_stream(outcome, self.state.bytes_streamed, elapsed);
        tracing::info!(
            request_id = %self.state.request_id,
            outcome,
            bytes = self.state.bytes_streamed,
            duration_ms = elapsed.as_millis() as u64,
            "Relay finished"
        );
    }
}

impl Stream for RelayBody {
    type Item = Result<Bytes, RelayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }

        if this.deadline.as_mut().poll(cx).is_ready() {
            let err = DeadlineExceeded {
                elapsed: this.started.elapsed(),
            };
            this.finish("deadline");
            return Poll::Ready(Some(Err(err.into())));
        }

        match this.upstream.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.state.bytes_streamed += chunk.len() as u64;
                if let Err(e) = this.state.limit.check_observed(this.state.bytes_streamed) {
                    tracing::warn!(
                        request_id = %this.state.request_id,
                        observed = e.size,
                        limit = e.limit,
                        "Response exceeded size limit mid-stream"
                    );
                    this.finish("too_large");
                    return Poll::Ready(Some(Err(e.into())));
                }
                this.pulse.reset();
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!(request_id = %this.state.request_id, error = %e, "Upstream body error");
                this.finish("upstream_error");
                Poll::Ready(Some(Err(RelayError::Upstream(e))))
            }
            Poll::Ready(None) => {
                this.finish("complete");
                Poll::Ready(None)
            }
            Poll::Pending => {
                if this.pulse.poll_tick(cx).is_ready() {
                    tracing::trace!(request_id = %this.state.request_id, "Liveness pulse");
                    return Poll::Ready(Some(Ok(Bytes::new())));
                }
                Poll::Pending
            }
        }
    }
}

impl Drop for RelayBody {
    fn drop(&mut self) {
        if !self.finished {
            self.finish("client_gone");
        }
    }
}
