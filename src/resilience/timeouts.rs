//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound each upstream attempt (provider-specific)
//! - Bound the whole request by its overall deadline
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - A deadline hit before streaming starts returns 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// An attempt did not produce response headers in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("attempt timed out after {0:?}")]
pub struct AttemptTimedOut(pub Duration);

/// The overall request deadline passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("request deadline exceeded after {elapsed:?}")]
pub struct DeadlineExceeded {
    pub elapsed: Duration,
}

/// Run `fut`, bounded by `limit` when one is set.
pub async fn with_attempt_timeout<F>(limit: Option<Duration>, fut: F) -> Result<F::Output, AttemptTimedOut>
where
    F: Future,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| AttemptTimedOut(limit)),
        None => Ok(fut.await),
    }
}

/// Run `fut` until `deadline`; `started` is used to report the elapsed time.
pub async fn before_deadline<F>(started: Instant, deadline: Instant, fut: F) -> Result<F::Output, DeadlineExceeded>
where
    F: Future,
{
    tokio::time::timeout_at(deadline, fut)
        .await
        .map_err(|_| DeadlineExceeded {
            elapsed: started.elapsed(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout_applies_only_when_set() {
        let slow = tokio::time::sleep(Duration::from_secs(20));
        assert_eq!(
            with_attempt_timeout(Some(Duration::from_secs(15)), slow).await,
            Err(AttemptTimedOut(Duration::from_secs(15)))
        );

        let slow = tokio::time::sleep(Duration::from_secs(20));
        assert_eq!(with_attempt_timeout(None, slow).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_reports_elapsed() {
        let started = Instant::now();
        let deadline = started + Duration::from_secs(120);

        let result = before_deadline(started, deadline, std::future::pending::<()>()).await;
        let err = result.unwrap_err();
        assert!(err.elapsed >= Duration::from_secs(120));

        let ok = before_deadline(Instant::now(), Instant::now() + Duration::from_secs(1), async { 7 }).await;
        assert_eq!(ok, Ok(7));
    }
}
