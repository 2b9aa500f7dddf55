//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): proxy requests by status and outcome
//! - `relay_request_duration_seconds` (histogram): time to response head
//! - `relay_failures_total` (counter): client-visible failures by code
//! - `relay_rate_limited_total` (counter): admission rejections
//! - `relay_upstream_retries_total` (counter): retries by reason
//! - `relay_streams_total` (counter): finished streams by outcome
//! - `relay_bytes_streamed_total` (counter): body bytes forwarded
//! - `relay_stream_duration_seconds` (histogram): full transfer time
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Duration;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tokio::time::Instant;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(status: u16, outcome: &'static str, started: Instant) {
    metrics::counter!(
        "relay_requests_total",
        "status" => status.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("relay_request_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_failure(code: &'static str) {
    metrics::counter!("relay_failures_total", "code" => code).increment(1);
}

pub fn record_rate_limited() {
    metrics::counter!("relay_rate_limited_total").increment(1);
}

pub fn record_retry(reason: &'static str) {
    metrics::counter!("relay_upstream_retries_total", "reason" => reason).increment(1);
}

pub fn record_stream(outcome: &'static str, bytes: u64, elapsed: Duration) {
    metrics::counter!("relay_streams_total", "outcome" => outcome).increment(1);
    metrics::counter!("relay_bytes_streamed_total").increment(bytes);
    metrics::histogram!("relay_stream_duration_seconds").record(elapsed.as_secs_f64());
}
