//! Ghostbridge relay client
//!
//! Runs the local HTTP CONNECT gateway and tunnels every accepted session
//! to the configured relay over a fingerprint-disguised WebSocket.

use anyhow::{Context, Result};
use clap::Parser;
use ghostbridge::{Config, TunnelService};
use tracing::info;

/// Covert CONNECT-to-WebSocket tunneling relay
#[derive(Parser, Debug)]
#[command(name = "ghostbridge")]
#[command(version)]
struct Args {
    /// Configuration file path (created with defaults if missing)
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Local listen port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Shared relay password (overrides config)
    #[arg(long)]
    password: Option<String>,

    /// Relay hostname (overrides config)
    #[arg(long)]
    relay: Option<String>,

    /// Chunk size in KiB (overrides config)
    #[arg(long)]
    chunk: Option<i32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&*args.log_level)
        .init();

    let mut config = Config::load(&args.config).context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(password) = args.password {
        config.password = password;
    }
    if let Some(relay) = args.relay {
        config.wss = relay;
    }
    if let Some(chunk) = args.chunk {
        config.chunk = chunk;
    }

    info!("ghostbridge v{}", ghostbridge::VERSION);
    info!(relay = %config.wss, port = config.port, chunk_kib = config.chunk, "starting gateway");

    let mut service = TunnelService::new();
    service.start(&config).await.context("failed to start gateway")?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down...");
    service.stop();

    Ok(())
}
