//! Target URL matching logic.
//!
//! # Responsibilities
//! - Match target host (exact or subdomain, case-insensitive)
//! - Match target path extension (case-insensitive)
//! - Combine conditions with OR semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive
//! - Empty matcher set = never matches
//! - No regex to guarantee O(n) matching

use url::Url;

/// Trait for matching target URLs against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the URL matches this condition.
    fn matches(&self, url: &Url) -> bool;
}

/// Matches a host and all of its subdomains.
#[derive(Debug, Clone)]
pub struct HostSuffixMatcher {
    suffix: String,
}

impl HostSuffixMatcher {
    /// Create a new host matcher.
    /// The suffix is normalized to lowercase, without a leading dot.
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into().trim_start_matches('.').to_lowercase(),
        }
    }
}

impl Matcher for HostSuffixMatcher {
    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        host == self.suffix
            || host
                .strip_suffix(&self.suffix)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

/// Matches the file extension of the last path segment.
#[derive(Debug, Clone)]
pub struct PathExtensionMatcher {
    extensions: Vec<String>,
}

impl PathExtensionMatcher {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }
}

impl Matcher for PathExtensionMatcher {
    fn matches(&self, url: &Url) -> bool {
        let last_segment = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default();
        match last_segment.rsplit_once('.') {
            Some((_, ext)) => {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            }
            None => false,
        }
    }
}

/// Combines multiple matchers with OR semantics.
#[derive(Debug, Default)]
pub struct AnyMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AnyMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn push(&mut self, matcher: Box<dyn Matcher>) {
        self.matchers.push(matcher);
    }
}

impl Matcher for AnyMatcher {
    fn matches(&self, url: &Url) -> bool {
        self.matchers.iter().any(|m| m.matches(url))
    }
}
