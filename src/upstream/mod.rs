//! Upstream subsystem.
//!
//! # Data Flow
//! ```text
//! target URL
//!     → provider.rs (profile lookup: headers, expiry, attempt timeout)
//!     → resilience::retries (attempt loop)
//!     → UpstreamResponse (status, headers, body stream)
//!     → moved into relay::pipeline
//! ```

pub mod provider;

use std::fmt;
use std::time::Duration;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};

use crate::config::UpstreamConfig;

pub use provider::{ProviderProfile, ProviderRegistry};

/// Boxed error type of upstream body streams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body of an upstream response, consumed exactly once by the relay.
pub type UpstreamBody = BoxStream<'static, Result<Bytes, BoxError>>;

/// A response obtained from upstream.
///
/// Owned by the fetcher until returned, then moved into the relay.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
    /// Attempts it took to obtain this response.
    pub attempts: u32,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: UpstreamBody) -> Self {
        Self {
            status,
            headers,
            body,
            attempts: 1,
        }
    }

    pub fn from_reqwest(mut response: reqwest::Response, attempts: u32) -> Self {
        let status = response.status();
        let headers = std::mem::take(response.headers_mut());
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(BoxError::from))
            .boxed();
        Self {
            status,
            headers,
            body,
            attempts,
        }
    }
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

/// Build the shared upstream HTTP client.
pub fn build_client(config: &UpstreamConfig) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .user_agent(config.user_agent.clone());
    if !config.use_system_proxy {
        builder = builder.no_proxy();
    }
    builder.build()
}
