//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4) and read it back in handlers
//! - Derive the client identity used as the admission key
//! - Capture the immutable per-request context (`ProxyRequest`)
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Forwarded-address header is only trusted when configured

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderValue, Request};
use std::fmt;
use std::net::SocketAddr;
use tokio::time::Instant;
use tower_http::request_id::{MakeRequestId, RequestId as TowerRequestId};
use url::Url;
use uuid::Uuid;

/// Header carrying the correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Header carrying the original client address when behind another proxy.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Opaque per-request correlation token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read the request ID stamped by the request-id layer.
pub trait RequestIdExt {
    fn request_id(&self) -> RequestId;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> RequestId {
        let id = self
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        RequestId(id.to_string())
    }
}

/// Generates UUID v4 request IDs for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeUuidRequestId;

impl MakeRequestId for MakeUuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<TowerRequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(TowerRequestId::new)
    }
}

/// Key under which a client is counted by the admission limiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Derive the identity from the forwarded-address header (when trusted)
    /// or the peer address.
    pub fn from_request<B>(request: &Request<B>, trust_forwarded_for: bool) -> Self {
        if trust_forwarded_for {
            let forwarded = request
                .headers()
                .get(X_FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(addr) = forwarded {
                return Self(addr.to_string());
            }
        }

        match request.extensions().get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(addr)) => Self(addr.ip().to_string()),
            None => Self("unknown".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable context of one `/proxy` request.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub target: Url,
    pub range: Option<String>,
    pub request_id: RequestId,
    pub received_at: Instant,
}

impl ProxyRequest {
    pub fn new<B>(target: Url, request: &Request<B>) -> Self {
        let request_id = request.request_id();
        let range = request.headers().get(header::RANGE).and_then(|v| match v.to_str() {
            Ok(range) => Some(range.to_string()),
            Err(_) => {
                // Unusable range: serve the full body.
                tracing::warn!(
                    request_id = %request_id,
                    range = ?v,
                    "Ignoring non-ASCII Range header"
                );
                None
            }
        });
        Self {
            target,
            range,
            request_id,
            received_at: Instant::now(),
        }
    }

    /// `Range` to send upstream: the client's verbatim, else `default`.
    pub fn upstream_range<'a>(&'a self, default: &'a str) -> &'a str {
        self.range.as_deref().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn client_identity_prefers_first_forwarded_entry() {
        let mut req = Request::builder()
            .header(X_FORWARDED_FOR, " 203.0.113.7 , 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo("127.0.0.1:5000".parse::<SocketAddr>().unwrap()));

        assert_eq!(ClientIdentity::from_request(&req, true).as_str(), "203.0.113.7");
        assert_eq!(ClientIdentity::from_request(&req, false).as_str(), "127.0.0.1");
    }

    #[test]
    fn client_identity_without_address() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(ClientIdentity::from_request(&req, true).as_str(), "unknown");
    }

    #[test]
    fn range_defaults_when_absent() {
        let target = Url::parse("https://example.com/video.mp4").unwrap();

        let req = Request::builder()
            .header(X_REQUEST_ID, "abc")
            .body(Body::empty())
            .unwrap();
        let proxy_req = ProxyRequest::new(target.clone(), &req);
        assert_eq!(proxy_req.upstream_range("bytes=0-"), "bytes=0-");
        assert_eq!(proxy_req.request_id.as_str(), "abc");

        let req = Request::builder()
            .header(header::RANGE, "bytes=500-999")
            .body(Body::empty())
            .unwrap();
        let proxy_req = ProxyRequest::new(target, &req);
        assert_eq!(proxy_req.upstream_range("bytes=0-"), "bytes=500-999");
    }

    #[test]
    fn non_ascii_range_falls_back_to_default() {
        let target = Url::parse("https://example.com/video.mp4").unwrap();
        let req = Request::builder()
            .header(header::RANGE, HeaderValue::from_bytes(b"bytes=\xff-").unwrap())
            .body(Body::empty())
            .unwrap();

        let proxy_req = ProxyRequest::new(target, &req);
        assert!(proxy_req.range.is_none());
        assert_eq!(proxy_req.upstream_range("bytes=0-"), "bytes=0-");
    }

    #[test]
    fn uuid_request_ids_are_unique() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let mut maker = MakeUuidRequestId;
        let a = maker.make_request_id(&req).unwrap();
        let b = maker.make_request_id(&req).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }
}
