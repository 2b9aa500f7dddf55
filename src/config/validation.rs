//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows, attempts, timers > 0)
//! - Check provider profiles are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("retries.max_delay_ms ({max}) is below retries.base_delay_ms ({base})")]
    DelayBounds { base: u64, max: u64 },

    #[error("relay.keepalive_interval_secs ({keepalive}) must be below relay.deadline_secs ({deadline})")]
    KeepaliveAfterDeadline { keepalive: u64, deadline: u64 },

    #[error("relay.default_range {0:?} is not a bytes range")]
    DefaultRange(String),

    #[error("provider {0:?} has no host suffixes")]
    ProviderWithoutHosts(String),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.port == 0 {
        errors.push(ValidationError::Zero { field: "listener.port" });
    }
    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.window_secs" });
    }
    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::Zero { field: "rate_limit.max_requests" });
    }
    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::Zero { field: "retries.max_attempts" });
    }
    if config.retries.max_delay_ms < config.retries.base_delay_ms {
        errors.push(ValidationError::DelayBounds {
            base: config.retries.base_delay_ms,
            max: config.retries.max_delay_ms,
        });
    }
    if config.relay.max_body_bytes == 0 {
        errors.push(ValidationError::Zero { field: "relay.max_body_bytes" });
    }
    if config.relay.deadline_secs == 0 {
        errors.push(ValidationError::Zero { field: "relay.deadline_secs" });
    }
    if config.relay.keepalive_interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "relay.keepalive_interval_secs" });
    } else if config.relay.keepalive_interval_secs >= config.relay.deadline_secs
        && config.relay.deadline_secs > 0
    {
        errors.push(ValidationError::KeepaliveAfterDeadline {
            keepalive: config.relay.keepalive_interval_secs,
            deadline: config.relay.deadline_secs,
        });
    }
    if !config.relay.default_range.starts_with("bytes=") {
        errors.push(ValidationError::DefaultRange(config.relay.default_range.clone()));
    }

    for provider in &config.providers {
        if provider.host_suffixes.is_empty() {
            errors.push(ValidationError::ProviderWithoutHosts(provider.name.clone()));
        }
        if provider.attempt_timeout_secs == 0 {
            errors.push(ValidationError::Zero { field: "providers.attempt_timeout_secs" });
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.rate_limit.window_secs = 0;
        config.retries.max_attempts = 0;
        config.relay.default_range = "items=0-".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::Zero { field: "rate_limit.window_secs" }));
        assert!(errors.contains(&ValidationError::Zero { field: "retries.max_attempts" }));
        assert!(errors.contains(&ValidationError::DefaultRange("items=0-".into())));
    }

    #[test]
    fn keepalive_must_fit_inside_deadline() {
        let mut config = ProxyConfig::default();
        config.relay.keepalive_interval_secs = 200;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::KeepaliveAfterDeadline { keepalive: 200, deadline: 120 }]
        );
    }
}
