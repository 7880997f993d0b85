//! Edge gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                     EDGE GATEWAY                      │
//!   Client Request     │  ┌─────────┐   ┌──────────┐   ┌───────────────────┐   │
//!   ───────────────────┼─▶│  http   │──▶│ routing  │──▶│ gates: basic/jwt  │   │
//!                      │  │ server  │   │  table   │   │ then rate limits  │   │
//!                      │  └─────────┘   └──────────┘   └─────────┬─────────┘   │
//!                      │                                         ▼             │
//!   Client Response    │                               ┌───────────────────┐   │
//!   ◀──────────────────┼───────────────────────────────│ proxy (round      │◀──┼── Backend
//!                      │                               │ robin backends)   │   │
//!                      │                               └───────────────────┘   │
//!                      │  config (TOML + watcher)   lifecycle   observability  │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use edge_gateway::config::{load_config, watcher::ConfigWatcher, GatewayConfig};
use edge_gateway::lifecycle::{shutdown_signal, Shutdown};
use edge_gateway::observability::logging;
use edge_gateway::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "edge-gateway", version, about = "HTTP gateway with auth gates and rate limiting")]
struct Args {
    /// Path to the TOML config file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the config and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    if args.check {
        println!("configuration OK: {} routes, {} middlewares", config.routes.len(), config.middlewares.len());
        return Ok(());
    }

    logging::init(&config.observability.log_level);
    tracing::info!("edge-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    // Keep the watcher alive for the lifetime of the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, Some(config.clone()));
            (Some(watcher.run()?), Some(updates))
        }
        None => (None, None),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config)?;
    let mut server_task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    tokio::select! {
        result = &mut server_task => result??,
        _ = shutdown_signal() => {
            shutdown.trigger();
            server_task.await??;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
