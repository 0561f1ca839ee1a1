//! Pooled reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ Proxy::select ──▶ pool-set (main or first matching candidate)
//!                     (request id,                         │
//!                      trace, timeout)                     ▼
//!                                                   load balancer picks server
//!                                                          │ key = host:port
//!                                                          ▼
//!                                                   MultiKeyPool ──▶ ResourcePool(host:port)
//!                                                          │ borrowed connection
//!                                                          ▼
//!     Client Response ◀────────────────────────── upstream exchange ──▶ Backend
//!
//!     config watcher ──▶ Proxy::inherit ──▶ ArcSwap<Proxy>     admin API ──▶ status / pools
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use pooled_proxy::admin::setup_admin_router;
use pooled_proxy::config::{load_config, ConfigWatcher};
use pooled_proxy::filters::Registry;
use pooled_proxy::http::{AppState, HttpServer};
use pooled_proxy::lifecycle::{shutdown, wait_for_signal, Shutdown};
use pooled_proxy::observability;

#[derive(Parser)]
#[command(name = "pooled-proxy", version, about = "Reverse proxy with pooled upstream connections")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let registry = Arc::new(Registry::with_builtin());

    let config = match load_config(&args.config, &registry) {
        Ok(config) => config,
        Err(e) => {
            observability::logging::init("info");
            tracing::error!(path = ?args.config, error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };
    observability::logging::init(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        proxy = %config.proxy.name,
        pools = config.proxy.pools.len(),
        "pooled-proxy starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let state = AppState::new(&config)?;
    let shutdown = Shutdown::new();

    let (watcher, config_updates) = ConfigWatcher::new(&args.config, registry.clone());
    let _watcher = match watcher.run() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let app = setup_admin_router(state.clone(), &config.admin.api_key);
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown::recv(&mut stop).await })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match wait_for_signal().await {
                Ok(signal) => tracing::info!(signal, "Shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "Failed to install signal handler"),
            }
            shutdown.trigger();
        }
    });

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    HttpServer::new(state)
        .run(listener, config_updates, shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
