//! Relay pipeline: turns an upstream response into the client response.
//!
//! Everything here runs before the response head is handed to the server,
//! so every failure can still become a JSON error. Once `relay` returns
//! `Ok`, the body stream is the only thing left that can fail.

use std::time::Duration;
use axum::{
    body::Body,
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use tokio::time::Instant;

use crate::config::RelayConfig;
use crate::error::ProxyError;
use crate::http::request::ProxyRequest;
use crate::http::response::{copy_upstream_headers, ensure_content_type};
use crate::relay::body::{RelayBody, StreamState};
use crate::security::limits::BodyLimit;
use crate::upstream::UpstreamResponse;

/// Relay settings shared by all requests.
#[derive(Debug, Clone)]
pub struct Relay {
    limit: BodyLimit,
    keepalive: Duration,
    deadline: Duration,
    default_range: String,
}

impl Relay {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            limit: BodyLimit::new(config.max_body_bytes),
            keepalive: config.keepalive_interval(),
            deadline: config.deadline(),
            default_range: config.default_range.clone(),
        }
    }

    pub fn limit(&self) -> BodyLimit {
        self.limit
    }

    /// `Range` used upstream when the client sends none.
    pub fn default_range(&self) -> &str {
        &self.default_range
    }

    /// Instant after which this request is abandoned.
    pub fn deadline_for(&self, request: &ProxyRequest) -> Instant {
        request.received_at + self.deadline
    }

    /// Build the streaming client response from `upstream`.
    ///
    /// Takes ownership of the upstream response; on error it is dropped here,
    /// which closes the upstream connection.
    pub fn relay(&self, upstream: UpstreamResponse, request: &ProxyRequest) -> Result<Response, ProxyError> {
        let UpstreamResponse {
            status,
            headers: upstream_headers,
            body,
            attempts,
        } = upstream;

        if status == StatusCode::FORBIDDEN {
            tracing::warn!(request_id = %request.request_id, "Upstream forbade access");
            return Err(ProxyError::UpstreamForbidden);
        }

        let declared = self.limit.check_declared(&upstream_headers).map_err(|e| {
            tracing::warn!(
                request_id = %request.request_id,
                declared = e.size,
                limit = e.limit,
                "Upstream declared a body over the size limit"
            );
            ProxyError::from(e)
        })?;

        let mut headers = HeaderMap::with_capacity(upstream_headers.len() + 1);
        copy_upstream_headers(&upstream_headers, &mut headers, &request.request_id);
        ensure_content_type(&mut headers);

        // Upstream always gets a Range; a client that sent none gets the whole body as 200.
        let status = if status == StatusCode::PARTIAL_CONTENT && request.range.is_none() {
            headers.remove(header::CONTENT_RANGE);
            StatusCode::OK
        } else {
            status
        };

        tracing::info!(
            request_id = %request.request_id,
            status = %status,
            attempts,
            declared_length = ?declared,
            range = ?request.range,
            "Relaying upstream response"
        );

        let stream = RelayBody::new(
            body,
            StreamState::new(self.limit, request.request_id.clone()),
            self.keepalive,
            request.received_at,
            self.deadline_for(request),
        );

        let mut builder = Response::builder().status(status);
        if let Some(h) = builder.headers_mut() {
            *h = headers;
        }
        builder
            .body(Body::from_stream(stream))
            .map_err(|e| ProxyError::StreamSetupFailure {
                details: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body as AxumBody;
    use axum::http::{header, HeaderValue, Request};
    use bytes::Bytes;
    use futures_util::{stream, StreamExt};
    use url::Url;

    use crate::upstream::BoxError;

    fn relay(max_body_bytes: u64) -> Relay {
        Relay::from_config(&RelayConfig {
            max_body_bytes,
            ..RelayConfig::default()
        })
    }

    fn proxy_request(range: Option<&'static str>) -> ProxyRequest {
        let mut builder = Request::builder().header("x-request-id", "req-7");
        if let Some(range) = range {
            builder = builder.header(header::RANGE, range);
        }
        let req = builder.body(AxumBody::empty()).unwrap();
        ProxyRequest::new(Url::parse("https://example.com/video.mp4").unwrap(), &req)
    }

    fn upstream(status: StatusCode, headers: &[(header::HeaderName, &'static str)], body: &'static [u8]) -> UpstreamResponse {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(name.clone(), HeaderValue::from_static(value));
        }
        let chunks: Vec<Result<Bytes, BoxError>> = vec![Ok(Bytes::from_static(body))];
        UpstreamResponse::new(status, map, stream::iter(chunks).boxed())
    }

    #[tokio::test]
    async fn relays_status_headers_and_body() {
        let response = relay(1024)
            .relay(
                upstream(
                    StatusCode::OK,
                    &[(header::CONTENT_TYPE, "video/mp4"), (header::CONTENT_LENGTH, "5")],
                    b"12345",
                ),
                &proxy_request(None),
            )
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"12345");
    }

    #[tokio::test]
    async fn partial_content_stays_partial() {
        let response = relay(1024)
            .relay(
                upstream(
                    StatusCode::PARTIAL_CONTENT,
                    &[(header::CONTENT_RANGE, "bytes 500-999/5000")],
                    b"x",
                ),
                &proxy_request(Some("bytes=500-999")),
            )
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 500-999/5000");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/octet-stream");
    }

    #[tokio::test]
    async fn unrequested_partial_content_becomes_ok() {
        let response = relay(1024)
            .relay(
                upstream(
                    StatusCode::PARTIAL_CONTENT,
                    &[
                        (header::CONTENT_RANGE, "bytes 0-4/5"),
                        (header::ACCEPT_RANGES, "bytes"),
                    ],
                    b"12345",
                ),
                &proxy_request(None),
            )
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"12345");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_pulses_add_nothing_to_the_body() {
        let late = stream::once(async {
            tokio::time::sleep(std::time::Duration::from_secs(35)).await;
            Ok::<_, BoxError>(Bytes::from_static(b"late data"))
        })
        .boxed();
        let response = relay(1024)
            .relay(
                UpstreamResponse::new(StatusCode::OK, HeaderMap::new(), late),
                &proxy_request(None),
            )
            .unwrap();

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"late data");
    }

    #[test]
    fn declared_length_over_cap_fails_before_streaming() {
        let err = relay(100)
            .relay(
                upstream(StatusCode::OK, &[(header::CONTENT_LENGTH, "101")], b""),
                &proxy_request(None),
            )
            .unwrap_err();
        assert!(matches!(err, ProxyError::PayloadTooLarge { size: 101, limit: 100 }));
    }

    #[test]
    fn forbidden_is_classified() {
        let err = relay(100)
            .relay(upstream(StatusCode::FORBIDDEN, &[], b"no"), &proxy_request(None))
            .unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamForbidden));
    }

    #[tokio::test]
    async fn observed_overflow_errors_the_body() {
        let response = relay(3)
            .relay(upstream(StatusCode::OK, &[], b"12345"), &proxy_request(None))
            .unwrap();
        assert!(axum::body::to_bytes(response.into_body(), usize::MAX).await.is_err());
    }
}
