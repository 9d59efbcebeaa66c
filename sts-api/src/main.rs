//! sts-api: review scraping, classification and prioritization service

use anyhow::{Context, Result};
use clap::Parser;
use sts_common::config::load_module_config;
use sts_common::events::EventBus;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sts_api::config::{CliArgs, ServiceConfig, MODULE_NAME};
use sts_api::store::{open_backend, TaskStore};
use sts_api::AppState;

/// Broadcast buffer per subscriber before it lags
const EVENT_BUS_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();
    let toml_config = load_module_config(MODULE_NAME, cli.config.as_deref())
        .context("Failed to load config file")?;

    let log_level = cli
        .log_level
        .clone()
        .or_else(|| toml_config.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting {} v{}", MODULE_NAME, env!("CARGO_PKG_VERSION"));
    info!(
        git_hash = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Build info"
    );

    let config = ServiceConfig::resolve(&cli, &toml_config).context("Invalid configuration")?;

    let backend = open_backend(&config.store_url)
        .await
        .with_context(|| format!("Failed to open task store at {}", config.store_url))?;
    info!(backend = backend.name(), ttl_secs = config.task_ttl.as_secs(), "Task store ready");

    let store = TaskStore::new(backend, config.task_ttl, EventBus::new(EVENT_BUS_CAPACITY));
    let shutdown = CancellationToken::new();
    let sweeper = store.spawn_sweeper(config.sweep_interval, shutdown.clone());

    let bind_address = config.bind_address();
    let state = AppState::from_config(config, store).context("Failed to initialize services")?;
    let error_recorder = state.spawn_error_recorder(shutdown.clone());
    let app = sts_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    shutdown.cancel();
    let _ = tokio::join!(sweeper, error_recorder);

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
