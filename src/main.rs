use std::net::SocketAddr;
use std::path::PathBuf;
use clap::Parser;
use tokio::net::TcpListener;

use stream_relay::config::loader::{apply_env_overrides, load_config, ConfigError};
use stream_relay::config::validation::validate_config;
use stream_relay::observability::{logging, metrics};
use stream_relay::{HttpServer, ProxyConfig, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "stream-relay", version)]
#[command(about = "Streaming HTTP relay with retries, size limits and per-client admission", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port. Overrides both the file and the PORT variable.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    if let Some(port) = args.port {
        config.listener.port = port;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "stream-relay starting");

    tracing::info!(
        bind_address = %config.listener.bind_address(),
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        max_attempts = config.retries.max_attempts,
        max_body_bytes = config.relay.max_body_bytes,
        providers = config.providers.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(config.listener.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
