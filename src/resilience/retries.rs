//! Retry logic.
//!
//! # Responsibilities
//! - Execute upstream attempts strictly one after another
//! - Back off exponentially between attempts
//! - Honor upstream `Retry-After` on 429
//! - Apply provider quirks (headers, link expiry, per-attempt timeout)
//!
//! # Design Decisions
//! - Network failures and upstream 429s share one attempt budget
//! - Expired provider links fail before any network call
//! - Non-2xx responses are returned on the generic path and rejected on
//!   the provider path

use std::sync::Arc;
use std::time::Duration;
use axum::http::{header, HeaderMap, StatusCode};
use thiserror::Error;
use url::Url;

use crate::config::{RetryConfig, UpstreamConfig};
use crate::error::ProxyError;
use crate::http::request::RequestId;
use crate::observability::metrics;
use crate::resilience::backoff::{Backoff, Sleeper, TokioSleeper};
use crate::resilience::timeouts::{with_attempt_timeout, AttemptTimedOut};
use crate::upstream::provider::{unix_now, ProviderProfile, ProviderRegistry};
use crate::upstream::UpstreamResponse;

/// Terminal outcome of a failed fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("link expired at {expired_at}")]
    LinkExpired { expired_at: u64 },

    #[error("upstream unreachable after {attempts} attempts: {source}")]
    Unreachable {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream timed out after {attempts} attempts: {details}")]
    TimedOut { attempts: u32, details: String },

    #[error("upstream still rate limiting after {attempts} attempts")]
    RateLimited { attempts: u32, retry_after_secs: u64 },

    #[error("upstream rejected request with status {status}")]
    Rejected { status: StatusCode },

    #[error("invalid upstream request: {0}")]
    InvalidRequest(#[source] reqwest::Error),
}

impl From<FetchError> for ProxyError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::LinkExpired { expired_at } => ProxyError::LinkExpired { expired_at },
            FetchError::Unreachable { ref source, .. } => ProxyError::UpstreamUnreachable {
                details: error_chain(source),
            },
            FetchError::TimedOut { details, .. } => ProxyError::UpstreamTimeout { details },
            FetchError::RateLimited { retry_after_secs, .. } => {
                ProxyError::UpstreamRateLimited { retry_after_secs }
            }
            FetchError::Rejected { status } if status == StatusCode::FORBIDDEN => {
                ProxyError::UpstreamForbidden
            }
            FetchError::Rejected { status } => ProxyError::Unclassified {
                details: "upstream rejected the request".to_string(),
                upstream_status: Some(status.as_u16()),
            },
            FetchError::InvalidRequest(ref source) => ProxyError::Unclassified {
                details: error_chain(source),
                upstream_status: None,
            },
        }
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}

/// Why a single attempt produced no response.
#[derive(Debug)]
enum AttemptFailure {
    TimedOut(String),
    Network(reqwest::Error),
    Build(reqwest::Error),
}

impl From<reqwest::Error> for AttemptFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            AttemptFailure::Build(e)
        } else if e.is_timeout() {
            AttemptFailure::TimedOut(error_chain(&e))
        } else {
            AttemptFailure::Network(e)
        }
    }
}

impl From<AttemptTimedOut> for AttemptFailure {
    fn from(e: AttemptTimedOut) -> Self {
        AttemptFailure::TimedOut(e.to_string())
    }
}

impl AttemptFailure {
    fn into_fetch_error(self, attempts: u32) -> FetchError {
        match self {
            AttemptFailure::TimedOut(details) => FetchError::TimedOut { attempts, details },
            AttemptFailure::Network(source) => FetchError::Unreachable { attempts, source },
            AttemptFailure::Build(source) => FetchError::InvalidRequest(source),
        }
    }
}

/// Parse a `Retry-After` given in seconds.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Performs upstream GETs with bounded retries.
#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    client: reqwest::Client,
    providers: Arc<ProviderRegistry>,
    max_attempts: u32,
    backoff: Backoff,
    sleeper: Arc<dyn Sleeper>,
    rate_limited_retry_after_secs: u64,
}

impl RetryingFetcher {
    pub fn new(
        client: reqwest::Client,
        providers: Arc<ProviderRegistry>,
        retries: &RetryConfig,
        upstream: &UpstreamConfig,
    ) -> Self {
        Self {
            client,
            providers,
            max_attempts: retries.max_attempts.max(1),
            backoff: Backoff::from_config(retries),
            sleeper: Arc::new(TokioSleeper),
            rate_limited_retry_after_secs: upstream.rate_limited_retry_after_secs,
        }
    }

    /// Replace the delay primitive.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Fetch `url`, retrying network failures and upstream 429s.
    pub async fn fetch(
        &self,
        url: &Url,
        headers: &HeaderMap,
        request_id: &RequestId,
    ) -> Result<UpstreamResponse, FetchError> {
        let provider = self.providers.profile_for(url);

        if let Some(profile) = provider {
            if let Some(expired_at) = profile.expired_at(url, unix_now()) {
                tracing::warn!(
                    request_id = %request_id,
                    provider = profile.name(),
                    expired_at,
                    "Link already expired, not fetching"
                );
                return Err(FetchError::LinkExpired { expired_at });
            }
        }

        let mut attempt = 1;
        loop {
            let delay = self.backoff.delay_for(attempt);

            match self.attempt(url, headers, provider).await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if attempt >= self.max_attempts {
                        tracing::warn!(
                            request_id = %request_id,
                            attempts = attempt,
                            "Upstream rate limit persisted through all attempts"
                        );
                        return Err(FetchError::RateLimited {
                            attempts: attempt,
                            retry_after_secs: self.rate_limited_retry_after_secs,
                        });
                    }
                    let wait = parse_retry_after(response.headers()).unwrap_or(delay);
                    drop(response);
                    tracing::info!(
                        request_id = %request_id,
                        attempt,
                        delay = ?wait,
                        "Upstream returned 429, retrying"
                    );
                    metrics::record_retry("rate_limited");
                    self.sleeper.sleep(wait).await;
                }
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(
                        request_id = %request_id,
                        attempt,
                        status = %response.status(),
                        "Upstream responded"
                    );
                    return Ok(UpstreamResponse::from_reqwest(response, attempt));
                }
                Ok(response) => {
                    let status = response.status();
                    if let Some(profile) = provider {
                        tracing::warn!(
                            request_id = %request_id,
                            provider = profile.name(),
                            status = %status,
                            "Provider rejected request"
                        );
                        return Err(FetchError::Rejected { status });
                    }
                    tracing::debug!(request_id = %request_id, status = %status, "Upstream returned non-success status");
                    return Ok(UpstreamResponse::from_reqwest(response, attempt));
                }
                Err(AttemptFailure::Build(e)) => return Err(FetchError::InvalidRequest(e)),
                Err(failure) => {
                    if attempt >= self.max_attempts {
                        tracing::error!(
                            request_id = %request_id,
                            attempts = attempt,
                            error = ?failure,
                            "Upstream attempts exhausted"
                        );
                        return Err(failure.into_fetch_error(attempt));
                    }
                    tracing::warn!(
                        request_id = %request_id,
                        attempt,
                        delay = ?delay,
                        error = ?failure,
                        "Retrying after network error"
                    );
                    metrics::record_retry("network");
                    self.sleeper.sleep(delay).await;
                }
            }

            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        headers: &HeaderMap,
        provider: Option<&ProviderProfile>,
    ) -> Result<reqwest::Response, AttemptFailure> {
        let mut request = self.client.get(url.clone()).headers(headers.clone());
        if let Some(profile) = provider {
            request = request.headers(profile.headers().clone());
        }
        let limit = provider.map(ProviderProfile::attempt_timeout);

        let response = with_attempt_timeout(limit, request.send()).await??;
        Ok(response)
    }
}
