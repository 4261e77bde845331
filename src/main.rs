//! HTTP batch intermediary (draft-snell-http-batch-00).
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                   BATCH PROXY                    │
//!   multipart/batch      │  ┌────────┐   ┌──────────┐   ┌──────────────┐    │
//!   ─────────────────────┼─▶│  http  │──▶│ envelope │──▶│    parser    │    │
//!                        │  │ server │   │ validator│   │ (multipart)  │    │
//!                        │  └────────┘   └──────────┘   └──────┬───────┘    │
//!                        │                                     ▼            │      ┌─────────┐
//!                        │                              ┌──────────────┐    │─────▶│ targets │
//!                        │                              │  dispatcher  │◀───┼──────│         │
//!                        │                              └──────┬───────┘    │      └─────────┘
//!   multipart/batch      │  ┌────────┐   ┌──────────┐          │            │
//!   ◀────────────────────┼──│  http  │◀──│ composer │◀─────────┘            │
//!                        │  └────────┘   └──────────┘                       │
//!                        │                                                  │
//!                        │  config · observability · lifecycle · transport  │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use batch_proxy::config::{load_config, BatchConfig};
use batch_proxy::http::HttpServer;
use batch_proxy::lifecycle::{spawn_signal_handler, Shutdown};
use batch_proxy::observability::{logging, metrics, TracingSink};
use batch_proxy::transport::ReqwestTransport;

#[derive(Parser, Debug)]
#[command(name = "batch-proxy")]
#[command(about = "Fan out multipart/batch requests and collect the responses", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BatchConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!("batch-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        batch_path = %config.listener.batch_path,
        max_concurrency = config.dispatch.max_concurrency,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let transport = Arc::new(ReqwestTransport::from_config(&config.timeouts)?);
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listener bound");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config, transport, Arc::new(TracingSink));
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("batch-proxy stopped");
    Ok(())
}
