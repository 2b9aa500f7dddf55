//! Relay subsystem.
//!
//! # Data Flow
//! ```text
//! UpstreamResponse (moved in)
//!     → pipeline.rs (declared-size check, header filtering, status)
//!     → body.rs (counting stage, liveness pulse, deadline)
//!     → client connection
//! ```
//!
//! # Design Decisions
//! - Failures before the head is returned become JSON errors
//! - Failures after only terminate the connection
//! - Per-request counters only; nothing here is shared between requests

pub mod body;
pub mod pipeline;

pub use body::{RelayBody, RelayError, StreamState};
pub use pipeline::Relay;
