//! Provider profiles.
//!
//! Some upstreams only serve requests that look like they come from their own
//! web player, and hand out links that stop working after an expiry encoded in
//! the URL. A profile captures those quirks for a set of hosts.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use axum::http::{header, HeaderMap, HeaderValue};
use url::Url;

use crate::config::ProviderConfig;
use crate::routing::matcher::{AnyMatcher, HostSuffixMatcher, Matcher};

/// Request quirks of one provider.
#[derive(Debug)]
pub struct ProviderProfile {
    name: String,
    hosts: AnyMatcher,
    expiry_param: Option<String>,
    headers: HeaderMap,
    attempt_timeout: Duration,
}

impl ProviderProfile {
    pub fn from_config(config: &ProviderConfig) -> Self {
        let hosts = AnyMatcher::new(
            config
                .host_suffixes
                .iter()
                .map(|h| Box::new(HostSuffixMatcher::new(h.as_str())) as Box<dyn Matcher>)
                .collect(),
        );

        let mut headers = HeaderMap::new();
        let wanted = [
            (header::REFERER, &config.referer),
            (header::ORIGIN, &config.origin),
            (header::USER_AGENT, &config.user_agent),
        ];
        for (name, value) in wanted {
            let Some(value) = value else { continue };
            match HeaderValue::from_str(value) {
                Ok(v) => {
                    headers.insert(name, v);
                }
                Err(_) => {
                    tracing::warn!(provider = %config.name, header = %name, "Ignoring invalid provider header value");
                }
            }
        }

        Self {
            name: config.name.clone(),
            hosts,
            expiry_param: config.expiry_param.clone(),
            headers,
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, url: &Url) -> bool {
        self.hosts.matches(url)
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Headers presented upstream to look like the provider's own player.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Expiry encoded in the URL, as Unix seconds.
    pub fn expiry(&self, url: &Url) -> Option<u64> {
        let param = self.expiry_param.as_deref()?;
        url.query_pairs()
            .find(|(k, _)| k == param)
            .and_then(|(_, v)| v.trim().parse().ok())
    }

    /// Returns the expiry when the link is already dead at `now_secs`.
    pub fn expired_at(&self, url: &Url, now_secs: u64) -> Option<u64> {
        self.expiry(url).filter(|expiry| *expiry <= now_secs)
    }
}

/// All configured provider profiles; first match wins.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    profiles: Vec<ProviderProfile>,
}

impl ProviderRegistry {
    pub fn from_config(configs: &[ProviderConfig]) -> Self {
        Self {
            profiles: configs.iter().map(ProviderProfile::from_config).collect(),
        }
    }

    pub fn profile_for(&self, url: &Url) -> Option<&ProviderProfile> {
        self.profiles.iter().find(|p| p.matches(url))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Current wall-clock time in Unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
