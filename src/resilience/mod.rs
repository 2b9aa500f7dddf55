//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream fetch:
//!     → retries.rs (attempt loop, provider quirks)
//!     → timeouts.rs (per-attempt timeout, overall deadline)
//!     → On failure: backoff.rs (exponential delay via injected Sleeper)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries are sequential; no hedged or parallel attempts
//! - Retry budget is a fixed attempt count per request

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use backoff::{Backoff, Sleeper, TokioSleeper};
pub use retries::{FetchError, RetryingFetcher};
