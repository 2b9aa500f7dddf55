//! Fixed-window admission limiting.
//!
//! Each client gets `max_requests` per window. Every request is counted,
//! admitted or not. A single reset task clears all counters at each window
//! boundary, so every blocked client recovers at the same instant.

use std::sync::Arc;
use std::time::Duration;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::RateLimitConfig;
use crate::error::ProxyError;
use crate::http::request::{ClientIdentity, RequestIdExt};
use crate::observability::metrics;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected { retry_after_secs: u64 },
}

/// Per-client request counters for the current window.
#[derive(Debug)]
pub struct AdmissionLimiter {
    counts: DashMap<ClientIdentity, u32>,
    window: Duration,
    max_requests: u32,
    enabled: bool,
    trust_forwarded_for: bool,
}

impl AdmissionLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            counts: DashMap::new(),
            window: config.window(),
            max_requests: config.max_requests,
            enabled: config.enabled,
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }

    /// Count a request from `client` and decide whether it may proceed.
    pub fn admit(&self, client: &ClientIdentity) -> Admission {
        let count = {
            let mut entry = self.counts.entry(client.clone()).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };

        if count <= self.max_requests {
            Admission::Allowed
        } else {
            Admission::Rejected {
                retry_after_secs: self.window.as_secs(),
            }
        }
    }

    /// Requests counted for `client` in the current window.
    pub fn count(&self, client: &ClientIdentity) -> u32 {
        self.counts.get(client).map(|c| *c).unwrap_or(0)
    }

    /// Drop every counter. Called at each window boundary.
    pub fn reset(&self) {
        let tracked = self.counts.len();
        self.counts.clear();
        tracing::debug!(tracked_clients = tracked, "Rate window reset");
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn tracked_clients(&self) -> usize {
        self.counts.len()
    }

    /// Start the single reset timer. It stops when `shutdown` fires.
    pub fn spawn_reset_task(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + limiter.window, limiter.window);
            loop {
                tokio::select! {
                    _ = ticker.tick() => limiter.reset(),
                    _ = shutdown.recv() => {
                        tracing::debug!("Rate window reset task exiting");
                        break;
                    }
                }
            }
        })
    }
}

/// Middleware gating every request through the admission limiter.
pub async fn admission_middleware(
    State(limiter): State<Arc<AdmissionLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let client = ClientIdentity::from_request(&request, limiter.trust_forwarded_for);
    match limiter.admit(&client) {
        Admission::Allowed => next.run(request).await,
        Admission::Rejected { retry_after_secs } => {
            let request_id = request.request_id();
            tracing::warn!(
                request_id = %request_id,
                client = %client,
                count = limiter.count(&client),
                "Rate limit exceeded"
            );
            metrics::record_rate_limited();
            ProxyError::RateLimited { retry_after_secs }
                .into_response_with_id(Some(&request_id))
        }
    }
}
