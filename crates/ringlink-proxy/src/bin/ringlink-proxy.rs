//! ringlink-proxy - CORS relay in front of the upstream metrics API

use anyhow::{Context, Result};
use clap::Parser;
use ringlink_config::DEFAULT_BASE_URL;
use ringlink_proxy::{HttpUpstream, ProxyServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ringlink-proxy")]
#[command(about = "CORS relay for the upstream metrics API", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "RINGLINK_PROXY_LISTEN", default_value = "127.0.0.1:8787")]
    listen: SocketAddr,

    /// Upstream collection base URL; the endpoint name is appended
    #[arg(short, long, env = "RINGLINK_PROXY_UPSTREAM", default_value = DEFAULT_BASE_URL)]
    upstream: String,

    /// Upstream request timeout in seconds
    #[arg(short, long, default_value_t = 15)]
    timeout_secs: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        upstream = %args.upstream,
        "ringlink-proxy starting"
    );

    let upstream = HttpUpstream::new(&args.upstream, Duration::from_secs(args.timeout_secs))
        .context("Failed to create upstream client")?;
    let server = ProxyServer::bind(args.listen, Arc::new(upstream))
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

    tokio::select! {
        result = server.serve() => result.context("Relay stopped")?,
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("Received SIGINT, shutting down"),
    }

    Ok(())
}
