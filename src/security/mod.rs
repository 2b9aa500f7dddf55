//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client fixed-window admission)
//!     → [fetch and relay]
//!
//! Upstream response:
//!     → limits.rs (declared and observed body size cap)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod limits;
pub mod rate_limit;

pub use limits::{BodyLimit, LimitExceeded};
pub use rate_limit::{admission_middleware, Admission, AdmissionLimiter};
