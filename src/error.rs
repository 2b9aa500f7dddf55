//! Failure classification.
//!
//! Every failure that happens before the response head is committed is mapped
//! to exactly one `ProxyError` variant, which renders as a JSON envelope.
//! Failures after streaming started never reach this module; they can only
//! terminate the connection (see `relay::body`).

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::http::request::RequestId;
use crate::observability::metrics;

/// Client-visible failure kinds.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("missing required query parameter `{0}`")]
    MissingParameter(&'static str),

    #[error("invalid target url: {0}")]
    InvalidTarget(String),

    #[error("too many requests, try again in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("upstream host unreachable")]
    UpstreamUnreachable { details: String },

    #[error("upstream did not respond in time")]
    UpstreamTimeout { details: String },

    #[error("upstream is rate limiting requests, try again later")]
    UpstreamRateLimited { retry_after_secs: u64 },

    #[error("upstream refused access to this resource, try a different format or quality")]
    UpstreamForbidden,

    #[error("link expired, request a fresh link")]
    LinkExpired { expired_at: u64 },

    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("failed to set up response stream")]
    StreamSetupFailure { details: String },

    #[error("proxy error")]
    Unclassified {
        details: String,
        upstream_status: Option<u16>,
    },
}

impl ProxyError {
    /// HTTP status for this failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MissingParameter(_) | ProxyError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ProxyError::RateLimited { .. } | ProxyError::UpstreamRateLimited { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ProxyError::UpstreamUnreachable { .. } => StatusCode::NOT_FOUND,
            ProxyError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamForbidden => StatusCode::FORBIDDEN,
            ProxyError::LinkExpired { .. } => StatusCode::GONE,
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::StreamSetupFailure { .. } | ProxyError::Unclassified { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::MissingParameter(_) => "MISSING_PARAMETER",
            ProxyError::InvalidTarget(_) => "INVALID_TARGET",
            ProxyError::RateLimited { .. } => "RATE_LIMITED",
            ProxyError::UpstreamUnreachable { .. } => "UPSTREAM_UNREACHABLE",
            ProxyError::UpstreamTimeout { .. } => "UPSTREAM_TIMEOUT",
            ProxyError::UpstreamRateLimited { .. } => "UPSTREAM_RATE_LIMITED",
            ProxyError::UpstreamForbidden => "UPSTREAM_FORBIDDEN",
            ProxyError::LinkExpired { .. } => "LINK_EXPIRED",
            ProxyError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ProxyError::StreamSetupFailure { .. } => "STREAM_SETUP_FAILURE",
            ProxyError::Unclassified { .. } => "PROXY_ERROR",
        }
    }

    /// Seconds the client should wait before retrying, when meaningful.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ProxyError::RateLimited { retry_after_secs }
            | ProxyError::UpstreamRateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ProxyError::UpstreamUnreachable { details }
            | ProxyError::UpstreamTimeout { details }
            | ProxyError::StreamSetupFailure { details } => Some(details.clone()),
            ProxyError::Unclassified { details, upstream_status: Some(status) } => {
                Some(format!("{} (upstream status {})", details, status))
            }
            ProxyError::Unclassified { details, upstream_status: None } => Some(details.clone()),
            ProxyError::LinkExpired { expired_at } => Some(format!("link expired at {}", expired_at)),
            _ => None,
        }
    }

    /// Build the response, tagging it with the request ID when known.
    pub fn into_response_with_id(self, request_id: Option<&RequestId>) -> Response {
        let status = self.status_code();
        metrics::record_failure(self.code());

        let envelope = ErrorEnvelope {
            error: self.to_string(),
            code: self.code(),
            retry_after: self.retry_after(),
            details: self.details(),
            request_id: request_id.map(|id| id.to_string()),
        };

        let mut response = (status, Json(envelope)).into_response();
        if let Some(secs) = self.retry_after() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.into_response_with_id(None)
    }
}

/// JSON body of every pre-stream failure.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn status_mapping() {
        let cases = [
            (ProxyError::MissingParameter("url"), 400),
            (ProxyError::InvalidTarget("ftp://x".into()), 400),
            (ProxyError::RateLimited { retry_after_secs: 60 }, 429),
            (ProxyError::UpstreamUnreachable { details: "refused".into() }, 404),
            (ProxyError::UpstreamTimeout { details: "slow".into() }, 504),
            (ProxyError::UpstreamRateLimited { retry_after_secs: 60 }, 429),
            (ProxyError::UpstreamForbidden, 403),
            (ProxyError::LinkExpired { expired_at: 1 }, 410),
            (ProxyError::PayloadTooLarge { size: 2, limit: 1 }, 413),
            (ProxyError::StreamSetupFailure { details: "x".into() }, 500),
            (ProxyError::Unclassified { details: "x".into(), upstream_status: None }, 500),
        ];
        for (error, status) in cases {
            assert_eq!(error.status_code().as_u16(), status, "{:?}", error);
        }
    }

    #[tokio::test]
    async fn rate_limited_envelope_carries_retry_hint() {
        let response = ProxyError::RateLimited { retry_after_secs: 60 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");

        let body = body_json(response).await;
        assert_eq!(body["retryAfter"], 60);
        assert_eq!(body["code"], "RATE_LIMITED");
        assert!(body["error"].as_str().unwrap().contains("60 seconds"));
    }

    #[tokio::test]
    async fn envelope_includes_request_id_and_details() {
        let id = RequestId::from("req-1".to_string());
        let response = ProxyError::Unclassified {
            details: "boom".into(),
            upstream_status: Some(502),
        }
        .into_response_with_id(Some(&id));

        let body = body_json(response).await;
        assert_eq!(body["requestId"], "req-1");
        assert_eq!(body["details"], "boom (upstream status 502)");
        assert!(body.get("retryAfter").is_none());
    }
}
