//! Response handling and transformation.
//!
//! # Responsibilities
//! - Copy upstream headers to the client response
//! - Strip transport-framing headers the relay controls itself
//! - Default the content type of relayed bodies
//! - Build the redirect for page targets
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - A header that cannot be copied is skipped, never fatal

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use url::Url;

use crate::http::request::RequestId;

/// Headers whose framing the relay decides, never copied from upstream.
pub static RELAY_CONTROLLED_HEADERS: [HeaderName; 4] = [
    header::CONTENT_ENCODING,
    header::CONTENT_LENGTH,
    header::CONNECTION,
    header::TRANSFER_ENCODING,
];

/// Content type used when upstream sends none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Copy upstream headers into `target`, skipping relay-controlled ones.
///
/// Returns the number of headers that failed to copy.
pub fn copy_upstream_headers(
    upstream: &HeaderMap,
    target: &mut HeaderMap,
    request_id: &RequestId,
) -> usize {
    let mut skipped = 0;
    for (name, value) in upstream {
        if RELAY_CONTROLLED_HEADERS.contains(name) {
            continue;
        }
        if let Err(e) = target.try_append(name.clone(), value.clone()) {
            skipped += 1;
            tracing::warn!(
                request_id = %request_id,
                header = %name,
                error = %e,
                "Skipping upstream header"
            );
        }
    }
    skipped
}

/// Set `Content-Type: application/octet-stream` if missing.
pub fn ensure_content_type(headers: &mut HeaderMap) {
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(DEFAULT_CONTENT_TYPE),
        );
    }
}

/// `302 Found` pointing at `location`.
pub fn redirect_found(location: &Url) -> Response {
    match HeaderValue::from_str(location.as_str()) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)], Body::empty()).into_response(),
        // Unreachable for parsed URLs.
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}
