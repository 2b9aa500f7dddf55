//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, handlers)
//!     → request.rs (request ID, client identity, ProxyRequest)
//!     → [admission limiter gates the request]
//!     → [fetcher and relay pipeline produce the body]
//!     → response.rs (header filtering, redirects)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{ClientIdentity, ProxyRequest, RequestId, RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
