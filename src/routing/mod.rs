//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! `url` query parameter
//!     → router.rs (parse, classify)
//!     → matcher.rs (evaluate host / extension conditions)
//!     → Return: Media (fetch) or Page (302)
//! ```
//!
//! # Design Decisions
//! - Classifier compiled at startup, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always classifies the same way

pub mod matcher;
pub mod router;

pub use router::{parse_target, TargetClassifier, TargetKind};
