//! # missioned
//!
//! Mission relay server binary — wires up tracing, metrics, and the
//! HTTP/WebSocket server, then waits for a shutdown signal.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use missione_server::config::ServerConfig;
use missione_server::metrics;
use missione_server::server::MissioneServer;
use missione_server::shutdown::DEFAULT_DRAIN_TIMEOUT;
use tracing_subscriber::EnvFilter;

/// Warehouse mission relay server.
#[derive(Parser, Debug)]
#[command(name = "missioned", about = "Warehouse mission relay server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Directory served at `/` (index.html and assets).
    #[arg(long, default_value = "./static")]
    static_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("missioned=info,missione_server=info,tower_http=warn")
        }))
        .init();

    let metrics_handle = metrics::install_recorder();

    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        static_dir: cli.static_dir,
        ..ServerConfig::default()
    };

    let server = MissioneServer::new(config).with_metrics(metrics_handle);
    let (addr, server_task) = server
        .listen()
        .await
        .context("failed to bind the relay listener")?;
    tracing::info!(%addr, "missioned ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for the shutdown signal")?;
    tracing::info!("shutdown signal received");

    if !server
        .shutdown()
        .drain(vec![server_task], DEFAULT_DRAIN_TIMEOUT)
        .await
    {
        tracing::warn!("some server tasks did not drain in time");
    }
    Ok(())
}
