//! Response size limits.
//!
//! # Responsibilities
//! - Reject upstream bodies whose declared length exceeds the cap
//! - Detect bodies that grow past the cap while streaming
//!
//! # Design Decisions
//! - Declared length checked before any byte is streamed (early rejection)
//! - Observed length checked per chunk, since `Content-Length` may be absent or wrong
//! - Return 413 Payload Too Large when the response head is still ours to write

use axum::http::{header, HeaderMap};
use thiserror::Error;

use crate::error::ProxyError;

/// The cap was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{size} bytes exceeds the {limit} byte limit")]
pub struct LimitExceeded {
    pub size: u64,
    pub limit: u64,
}

impl From<LimitExceeded> for ProxyError {
    fn from(e: LimitExceeded) -> Self {
        ProxyError::PayloadTooLarge {
            size: e.size,
            limit: e.limit,
        }
    }
}

/// Maximum number of body bytes the relay forwards for one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimit {
    max_bytes: u64,
}

impl BodyLimit {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Parse `Content-Length`, ignoring malformed values.
    pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
        headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Check the declared length, returning it when within the cap.
    pub fn check_declared(&self, headers: &HeaderMap) -> Result<Option<u64>, LimitExceeded> {
        match Self::declared_length(headers) {
            Some(size) => self.check_observed(size).map(|_| Some(size)),
            None => Ok(None),
        }
    }

    /// Check a running byte total.
    pub fn check_observed(&self, total: u64) -> Result<(), LimitExceeded> {
        if total > self.max_bytes {
            Err(LimitExceeded {
                size: total,
                limit: self.max_bytes,
            })
        } else {
            Ok(())
        }
    }
}
