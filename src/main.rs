//! Session relay.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                  SESSION RELAY                   │
//!                     │                                                  │
//!   Client Request    │  ┌────────┐   ┌──────────┐   ┌───────────────┐  │
//!   ──────────────────┼─▶│  http  │──▶│  relay   │──▶│   upstream    │──┼──▶ Upstream
//!                     │  │ server │   │  engine  │   │ pool + dialer │  │
//!   Client Response   │  └────────┘   └────┬─────┘   └───────┬───────┘  │
//!   ◀─────────────────┼── streamed body ◀──┼─────────────────┘          │
//!                     │                    ▼                             │
//!                     │              ┌──────────┐      ┌──────────┐     │
//!                     │              │  store   │      │  health  │     │
//!                     │              │  (JSON)  │      │supervisor│     │
//!                     │              └──────────┘      └──────────┘     │
//!                     └──────────────────────────────────────────────────┘
//! ```
//!
//! Runs on a single-threaded Tokio runtime: one scheduler owns the
//! connection pool and the session cache.

use std::path::PathBuf;

use clap::Parser;

use session_relay::config::load_config;
use session_relay::lifecycle::signals::spawn_signal_handler;
use session_relay::lifecycle::{RelayService, Shutdown};
use session_relay::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "session-relay", version, about = "HTTP session relay with durable session state")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref())?;
    logging::init_logging(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "session-relay starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        targets = ?config.upstream.targets,
        data_dir = %config.store.data_dir.display(),
        keep_alive_secs = config.timeouts.keep_alive_secs,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

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

    let service = RelayService::bootstrap(config).await?;
    let listener = service.bind().await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    service.serve(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
