//! Dispatch gateway
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net::GracefulListener ──▶ http::server (hyper + axum)
//!                                                     │
//!                                                     ▼
//!                                   ┌──────── http::handlers ────────┐
//!                                   │  ContextPool.acquire           │
//!                                   │  AccountStore.lookup           │
//!                                   │  MethodRegistry → handler      │──▶ upstream API
//!                                   └──────────────┬─────────────────┘
//!                                                  ▼
//!     Client Response               http::recovery (envelope, logs,
//!     ◀──────────────────────────── fault classification, pool release)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use dispatch_gateway::config::{load_config, GatewayConfig};
use dispatch_gateway::lifecycle::{signals, start, Shutdown};
use dispatch_gateway::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "dispatch-gateway", version, about = "Internal method dispatch server")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Enable debug mode (debug logging and per-request trace).
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Gateway exited with error");
            eprintln!("dispatch-gateway: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    config.logging.debug |= args.debug;

    logging::init(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.server.bind_address,
        shutdown_timeout_secs = config.server.shutdown_timeout_secs,
        debug = config.logging.debug,
        log_in_file = config.logging.log_in_file,
        "dispatch-gateway starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let gateway = start(&config).await?;

    let shutdown = Shutdown::new();
    let stop = shutdown.subscribe();
    signals::spawn_signal_handler(shutdown);

    gateway.serve(stop).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
