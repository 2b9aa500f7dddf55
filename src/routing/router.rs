//! Target classification.
//!
//! # Responsibilities
//! - Validate the `url` query parameter as an absolute http(s) URL
//! - Decide whether a target is direct media (fetch and relay) or a
//!   browsable page (redirect the client there unproxied)
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Media evidence wins over page evidence
//! - Unknown targets are treated as media

use url::Url;

use crate::config::{ProviderConfig, RoutingConfig};
use crate::error::ProxyError;
use crate::routing::matcher::{AnyMatcher, HostSuffixMatcher, Matcher, PathExtensionMatcher};

/// What to do with a target URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// A direct media/CDN resource: fetch and relay.
    Media,
    /// A page: 302 the client to it.
    Page,
}

/// Classifies target URLs.
#[derive(Debug)]
pub struct TargetClassifier {
    media: AnyMatcher,
    pages: AnyMatcher,
}

impl TargetClassifier {
    /// Build from routing config; provider hosts always count as media.
    pub fn from_config(routing: &RoutingConfig, providers: &[ProviderConfig]) -> Self {
        let mut media = AnyMatcher::default();
        media.push(Box::new(PathExtensionMatcher::new(&routing.media_extensions)));
        for suffix in providers.iter().flat_map(|p| &p.host_suffixes) {
            media.push(Box::new(HostSuffixMatcher::new(suffix.as_str())));
        }

        let pages = AnyMatcher::new(
            routing
                .page_hosts
                .iter()
                .map(|h| Box::new(HostSuffixMatcher::new(h.as_str())) as Box<dyn Matcher>)
                .collect(),
        );

        Self { media, pages }
    }

    pub fn classify(&self, url: &Url) -> TargetKind {
        if self.media.matches(url) {
            TargetKind::Media
        } else if self.pages.matches(url) {
            TargetKind::Page
        } else {
            TargetKind::Media
        }
    }
}

/// Parse the raw `url` parameter.
pub fn parse_target(raw: &str) -> Result<Url, ProxyError> {
    let url = Url::parse(raw.trim()).map_err(|e| ProxyError::InvalidTarget(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(ProxyError::InvalidTarget(format!("{}: only http(s) targets are proxied", raw))),
    }
}
