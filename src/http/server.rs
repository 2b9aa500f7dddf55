//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, admission)
//! - Bind server to listener
//! - Drive each `/proxy` request through classify → fetch → relay
//! - Observability (metrics, correlation IDs)

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::request::{MakeUuidRequestId, ProxyRequest, RequestIdExt};
use crate::http::response::redirect_found;
use crate::observability::{metrics, tracing::RequestSpan};
use crate::relay::Relay;
use crate::resilience::retries::RetryingFetcher;
use crate::resilience::timeouts::before_deadline;
use crate::routing::{parse_target, TargetClassifier, TargetKind};
use crate::security::rate_limit::{admission_middleware, AdmissionLimiter};
use crate::upstream::{build_client, ProviderRegistry};

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub limiter: Arc<AdmissionLimiter>,
    pub fetcher: RetryingFetcher,
    pub relay: Relay,
    pub classifier: Arc<TargetClassifier>,
}

/// HTTP server for the streaming relay.
pub struct HttpServer {
    router: Router,
    limiter: Arc<AdmissionLimiter>,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        let client = build_client(&config.upstream)?;
        let providers = Arc::new(ProviderRegistry::from_config(&config.providers));
        let fetcher = RetryingFetcher::new(client, providers, &config.retries, &config.upstream);
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// Create a server around a pre-built fetcher.
    pub fn with_fetcher(config: ProxyConfig, fetcher: RetryingFetcher) -> Self {
        let limiter = Arc::new(AdmissionLimiter::new(&config.rate_limit));
        let state = AppState {
            limiter: Arc::clone(&limiter),
            fetcher,
            relay: Relay::from_config(&config.relay),
            classifier: Arc::new(TargetClassifier::from_config(&config.routing, &config.providers)),
        };

        let router = Self::build_router(state);
        Self {
            router,
            limiter,
            config,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let limiter = Arc::clone(&state.limiter);
        Router::new()
            .route("/", get(index_handler))
            .route("/proxy", get(proxy_handler))
            .fallback(not_found)
            .with_state(state)
            .layer(middleware::from_fn_with_state(limiter, admission_middleware))
            .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeUuidRequestId))
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn limiter(&self) -> &Arc<AdmissionLimiter> {
        &self.limiter
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            window_secs = self.limiter.window().as_secs(),
            max_requests = self.limiter.max_requests(),
            "HTTP server starting"
        );

        let reset_task = self.limiter.spawn_reset_task(shutdown.resubscribe());

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown requested, draining connections");
            })
            .await;

        reset_task.abort();
        tracing::info!("HTTP server stopped");
        result
    }
}

/// Query string of `/proxy`.
#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

/// Informational page with the active admission policy.
async fn index_handler(State(state): State<AppState>) -> Html<String> {
    let limiter = &state.limiter;
    let policy = if limiter.is_enabled() {
        format!(
            "{} requests per {} seconds per client",
            limiter.max_requests(),
            limiter.window().as_secs()
        )
    } else {
        "disabled".to_string()
    };
    Html(format!(
        "<!doctype html>\n<html><head><title>stream-relay</title></head><body>\
         <h1>stream-relay</h1>\
         <p>Usage: <code>GET /proxy?url=&lt;media url&gt;</code></p>\
         <p>Rate limit: {}</p>\
         <p>Maximum body size: {} bytes</p>\
         </body></html>\n",
        policy,
        state.relay.limit().max_bytes()
    ))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

/// `GET /proxy?url=...`
async fn proxy_handler(
    State(state): State<AppState>,
    query: Result<Query<ProxyQuery>, QueryRejection>,
    request: Request<Body>,
) -> Response {
    let started = Instant::now();
    let request_id = request.request_id();
    let request = request.map(|_| ());
    let query = query
        .map(|Query(query)| query)
        .map_err(|e| ProxyError::InvalidTarget(e.body_text()));

    let (response, outcome) = match proxy(&state, query, &request).await {
        Ok(response) if response.status() == StatusCode::FOUND => (response, "redirected"),
        Ok(response) => (response, "relayed"),
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                code = e.code(),
                error = %e,
                "Proxy request failed"
            );
            (e.into_response_with_id(Some(&request_id)), "failed")
        }
    };

    metrics::record_request(response.status().as_u16(), outcome, started);
    response
}

async fn proxy(
    state: &AppState,
    query: Result<ProxyQuery, ProxyError>,
    request: &Request<()>,
) -> Result<Response, ProxyError> {
    let raw = query?
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or(ProxyError::MissingParameter("url"))?;
    let target = parse_target(raw.trim())?;

    if state.classifier.classify(&target) == TargetKind::Page {
        tracing::debug!(request_id = %request.request_id(), target = %target, "Redirecting to page");
        return Ok(redirect_found(&target));
    }

    let proxy_request = ProxyRequest::new(target, request);
    let headers = upstream_headers(&proxy_request, state.relay.default_range())?;

    tracing::debug!(
        request_id = %proxy_request.request_id,
        target = %proxy_request.target,
        range = ?proxy_request.range,
        "Fetching upstream"
    );

    let upstream = before_deadline(
        proxy_request.received_at,
        state.relay.deadline_for(&proxy_request),
        state
            .fetcher
            .fetch(&proxy_request.target, &headers, &proxy_request.request_id),
    )
    .await
    .map_err(|e| ProxyError::UpstreamTimeout {
        details: e.to_string(),
    })??;

    state.relay.relay(upstream, &proxy_request)
}

/// Headers sent on every upstream attempt.
fn upstream_headers(request: &ProxyRequest, default_range: &str) -> Result<HeaderMap, ProxyError> {
    let range = request.upstream_range(default_range);
    let range = HeaderValue::from_str(range).map_err(|_| ProxyError::Unclassified {
        details: format!("unusable range header {:?}", range),
        upstream_status: None,
    })?;

    let mut headers = HeaderMap::with_capacity(2);
    headers.insert(header::RANGE, range);
    headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    Ok(headers)
}
