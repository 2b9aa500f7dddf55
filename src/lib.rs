//! Streaming HTTP relay.
//!
//! Fetches a client-supplied target URL from its origin and relays the body
//! back as a live byte stream, with admission limits, retries and a size cap.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ security::rate_limit (admission)
//!                                          │
//!                                          ▼
//!                                   routing (media or page?) ──▶ 302 for pages
//!                                          │
//!                                          ▼
//!                                   resilience::retries ──▶ upstream origin
//!                                          │ UpstreamResponse (moved)
//!                                          ▼
//!     Client Response ◀──────────── relay (headers, size cap, pulses, deadline)
//!
//!     Any failure before the response head ──▶ error::ProxyError (JSON envelope)
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod relay;
pub mod routing;
pub mod upstream;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
