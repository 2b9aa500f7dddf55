//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use axum::http::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use stream_relay::config::{ProviderConfig, ProxyConfig};
use stream_relay::resilience::backoff::Sleeper;
use stream_relay::{HttpServer, Shutdown};

/// What the mock upstream does with one connection.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Read the request, then close without answering.
    Drop,
    /// Read the request and hold the connection open without answering.
    Silent,
    Respond(MockResponse),
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    declare_length: bool,
}

impl MockResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            declare_length: true,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Send the body delimited by connection close instead of `Content-Length`.
    pub fn without_length(mut self) -> Self {
        self.declare_length = false;
        self
    }

    fn encode_head(&self) -> String {
        let reason = StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown");
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason);
        let has_length = self
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("content-length"));
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        if self.declare_length && !has_length {
            head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        head.push_str("Connection: close\r\n\r\n");
        head
    }
}

impl From<MockResponse> for MockReply {
    fn from(response: MockResponse) -> Self {
        MockReply::Respond(response)
    }
}

/// A raw TCP upstream whose replies are chosen per connection.
#[derive(Debug, Clone)]
pub struct MockUpstream {
    pub addr: SocketAddr,
    accepted: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockUpstream {
    /// Connections accepted so far.
    pub fn accepted(&self) -> u32 {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Raw request heads received so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start a programmable upstream on an ephemeral port.
///
/// `reply` gets the zero-based connection index and the raw request head.
pub async fn start_upstream<F>(reply: F) -> MockUpstream
where
    F: Fn(u32, &str) -> MockReply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream = MockUpstream {
        addr: listener.local_addr().unwrap(),
        accepted: Arc::new(AtomicU32::new(0)),
        requests: Arc::new(Mutex::new(Vec::new())),
    };

    let reply = Arc::new(reply);
    let state = upstream.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let index = state.accepted.fetch_add(1, Ordering::SeqCst);
            let reply = Arc::clone(&reply);
            let requests = Arc::clone(&state.requests);
            tokio::spawn(async move {
                serve_connection(socket, index, reply.as_ref(), requests).await;
            });
        }
    });

    upstream
}

/// Upstream that answers every connection the same way.
pub async fn start_fixed_upstream(response: MockResponse) -> MockUpstream {
    start_upstream(move |_, _| response.clone().into()).await
}

async fn serve_connection<F>(
    mut socket: TcpStream,
    index: u32,
    reply: &F,
    requests: Arc<Mutex<Vec<String>>>,
) where
    F: Fn(u32, &str) -> MockReply,
{
    let head = read_head(&mut socket).await;
    requests.lock().unwrap().push(head.clone());

    match reply(index, &head) {
        MockReply::Drop => {}
        MockReply::Silent => {
            tokio::time::sleep(Duration::from_secs(300)).await;
            drop(socket);
        }
        MockReply::Respond(response) => {
            let _ = socket.write_all(response.encode_head().as_bytes()).await;
            let _ = socket.write_all(&response.body).await;
            let _ = socket.shutdown().await;
        }
    }
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Value of `name` in a raw request head, case-insensitively.
pub fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (k, v) = line.split_once(':')?;
        k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

/// Address on which nothing is listening.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Records requested waits instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

/// Config tuned for tests: fast deterministic backoff.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.host = "127.0.0.1".to_string();
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 100;
    config.retries.jitter = false;
    config.upstream.connect_timeout_secs = 2;
    config
}

/// A provider profile covering the local mock upstream.
pub fn local_provider(expiry_param: Option<&str>) -> ProviderConfig {
    local_provider_with_timeout(expiry_param, 2)
}

pub fn local_provider_with_timeout(expiry_param: Option<&str>, attempt_timeout_secs: u64) -> ProviderConfig {
    ProviderConfig {
        name: "local".to_string(),
        host_suffixes: vec!["127.0.0.1".to_string()],
        expiry_param: expiry_param.map(str::to_string),
        referer: Some("https://player.example/".to_string()),
        origin: Some("https://player.example".to_string()),
        user_agent: None,
        attempt_timeout_secs,
    }
}

/// A running relay bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// `/proxy` URL for `target`, query-encoded.
    pub fn proxy_url(&self, target: &str) -> String {
        let mut url = url::Url::parse(&self.url("/proxy")).unwrap();
        url.query_pairs_mut().append_pair("url", target);
        url.to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_server(config: ProxyConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });
    TestServer { addr, shutdown }
}

/// Client that neither follows redirects nor uses system proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
