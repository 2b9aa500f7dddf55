//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the streaming relay.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (host, port).
    pub listener: ListenerConfig,

    /// Per-client admission limits.
    pub rate_limit: RateLimitConfig,

    /// Retry and backoff policy for upstream fetches.
    pub retries: RetryConfig,

    /// Body relay limits and timers.
    pub relay: RelayConfig,

    /// Upstream HTTP client settings.
    pub upstream: UpstreamConfig,

    /// Provider profiles with request quirks (expiring links, required headers).
    pub providers: Vec<ProviderConfig>,

    /// Target classification (media vs browsable page).
    pub routing: RoutingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retries: RetryConfig::default(),
            relay: RelayConfig::default(),
            upstream: UpstreamConfig::default(),
            providers: default_providers(),
            routing: RoutingConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind.
    pub host: String,

    /// TCP port. Overridden by the `PORT` environment variable.
    pub port: u16,
}

impl ListenerConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Fixed-window admission limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable the admission gate.
    pub enabled: bool,

    /// Window length in seconds. All counters reset together at each boundary.
    pub window_secs: u64,

    /// Maximum requests per client per window.
    pub max_requests: u32,

    /// Key clients by the first `X-Forwarded-For` entry when present.
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60,
            max_requests: 10,
            trust_forwarded_for: true,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per fetch, shared by network failures and upstream 429s.
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds. Doubles per attempt.
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff delay in milliseconds.
    pub max_delay_ms: u64,

    /// Add 0-10% random jitter to computed delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

/// Relay pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Largest body (declared or observed) the relay will forward.
    pub max_body_bytes: u64,

    /// Interval between liveness pulses on an open stream.
    pub keepalive_interval_secs: u64,

    /// Overall deadline per request, measured from arrival.
    pub deadline_secs: u64,

    /// `Range` sent upstream when the client sends none.
    pub default_range: String,
}

impl RelayConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 25 * 1024 * 1024, // 25 MiB
            keepalive_interval_secs: 10,
            deadline_secs: 120,
            default_range: "bytes=0-".to_string(),
        }
    }
}

/// Upstream HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// User-Agent sent when a provider profile does not set one.
    pub user_agent: String,

    /// `retryAfter` suggested to clients when upstream keeps answering 429.
    pub rate_limited_retry_after_secs: u64,

    /// Honor `HTTP_PROXY`/`HTTPS_PROXY` from the environment.
    pub use_system_proxy: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            user_agent: concat!("stream-relay/", env!("CARGO_PKG_VERSION")).to_string(),
            rate_limited_retry_after_secs: 60,
            use_system_proxy: false,
        }
    }
}

/// A provider whose links need special treatment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Provider identifier for logging.
    pub name: String,

    /// Hosts served by this provider, matched as case-insensitive suffixes.
    pub host_suffixes: Vec<String>,

    /// Query parameter holding the link expiry as Unix seconds.
    #[serde(default)]
    pub expiry_param: Option<String>,

    /// `Referer` to present upstream.
    #[serde(default)]
    pub referer: Option<String>,

    /// `Origin` to present upstream.
    #[serde(default)]
    pub origin: Option<String>,

    /// User-Agent override for this provider.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Timeout for obtaining response headers on each attempt.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

fn default_attempt_timeout_secs() -> u64 {
    15
}

/// The built-in provider list: time-limited video CDN links.
pub fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        name: "googlevideo".to_string(),
        host_suffixes: vec!["googlevideo.com".to_string()],
        expiry_param: Some("expire".to_string()),
        referer: Some("https://www.youtube.com/".to_string()),
        origin: Some("https://www.youtube.com".to_string()),
        user_agent: Some(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .to_string(),
        ),
        attempt_timeout_secs: default_attempt_timeout_secs(),
    }]
}

/// Target classification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Hosts whose URLs are pages to redirect to rather than fetch.
    pub page_hosts: Vec<String>,

    /// Path extensions that always mark a target as direct media.
    pub media_extensions: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            page_hosts: ["youtube.com", "youtu.be", "tiktok.com", "instagram.com"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            media_extensions: [
                "mp4", "webm", "m4a", "mp3", "mov", "mkv", "ogg", "wav", "aac", "m4v", "ts",
                "jpg", "jpeg", "png", "gif", "webp",
            ]
            .iter()
            .map(|e| e.to_string())
            .collect(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Log formatter.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
