//! Reconfigurable reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                  RETARGET PROXY                       │
//!                         │                                                       │
//!     Client Request      │  ┌──────────┐    ┌─────────┐    ┌───────────────┐    │
//!     ────────────────────┼─▶│  http    │───▶│dispatch │───▶│target resolver│    │
//!                         │  │  server  │    │         │    │ (file / cell) │    │
//!                         │  └──────────┘    └────┬────┘    └───────────────┘    │
//!                         │                       │                               │
//!                         │          ┌────────────┼─────────────┐                 │
//!                         │          ▼            ▼             ▼                 │
//!                         │   ┌───────────┐ ┌───────────┐ ┌────────────┐          │
//!                         │   │  config   │ │   HTTP    │ │ WebSocket  │          │
//!                         │   │  pages    │ │   relay   │ │   relay    │──────────┼──── Upstream
//!                         │   └───────────┘ └───────────┘ └────────────┘          │
//!                         │                                                       │
//!                         │  config (TOML + hot reload) · observability ·         │
//!                         │  lifecycle (signals, graceful shutdown)               │
//!                         └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use retarget_proxy::config::{load_config, watcher::ConfigWatcher, ProxyConfig};
use retarget_proxy::observability::{logging, metrics};
use retarget_proxy::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "retarget-proxy", version)]
#[command(about = "Reverse proxy with a runtime-configurable upstream target", long_about = None)]
struct Args {
    /// TOML configuration file. Watched for changes when given.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "retarget-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        mode = config.proxy.mode.as_str(),
        config_file = ?args.config,
        "Configuration loaded"
    );

    // Keep the watcher alive for the life of the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    tokio::spawn(shutdown.clone().trigger_on_signal());

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown_rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
