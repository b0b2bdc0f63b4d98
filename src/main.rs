//! Plant care platform backend.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (request id, trace, CORS, limits, timeout)
//!                         │
//!          ┌──────────────┼──────────────────┬───────────────┐
//!          ▼              ▼                  ▼               ▼
//!      /health/*      /api/v1/*           /admin/*        /metrics
//!       health        rate limit          admin key      Prometheus
//!                     + bearer auth
//!                         │
//!                         ▼
//!          users / subscriptions / integrations
//!                         │
//!          ┌──────────────┼──────────────────┐
//!          ▼              ▼                  ▼
//!        cache         event bus        circuit breakers
//!
//!     Background: cache sweeper, job scheduler (beat), worker pool
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use plant_care::config::watcher::ConfigWatcher;
use plant_care::config::{load_config, load_from_env};
use plant_care::lifecycle::signals::spawn_signal_listener;
use plant_care::observability::{logging, metrics};
use plant_care::{AppState, HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "plant-care")]
#[command(about = "Plant care platform backend", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults plus PLANT_CARE_* variables when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the configuration file when it changes.
    #[arg(short, long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = config.environment.as_str(),
        "plant-care starting"
    );

    let metrics_handle = if config.observability.metrics_enabled {
        metrics::init_metrics()
    } else {
        None
    };

    tracing::info!(
        bind_address = %config.server.bind_address,
        rate_limiting = config.rate_limit.enabled,
        jobs = config.jobs.enabled,
        admin = config.admin.enabled,
        "Configuration loaded"
    );

    let bind_address = config.server.bind_address.clone();
    let state = AppState::new(config, metrics_handle);

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone());
    state.spawn_background(&shutdown);

    // Kept alive until main returns.
    let _watcher = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let watcher = watcher.run()?;
            let reload_state = state.clone();
            tokio::spawn(async move {
                while let Some(config) = updates.recv().await {
                    reload_state.apply_config(config);
                }
            });
            Some(watcher)
        }
        (None, true) => {
            tracing::warn!("--watch ignored without --config");
            None
        }
        _ => None,
    };

    let listener = TcpListener::bind(&bind_address).await?;
    HttpServer::new(state).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
