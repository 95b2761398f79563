//! Tally server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tally_core::AppConfig;
use tally_server::{AppState, Archiver, create_router};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tally - a per-domain page view counter
#[derive(Parser, Debug)]
#[command(name = "tallyd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "TALLY_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Startup banner
    tracing::info!("Tally v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration (file is optional, env vars can provide/override
    // everything; every field has a working default)
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("TALLY_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    // Register Prometheus metrics
    tally_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    // Initialize the view store (opens both databases, runs migrations)
    let store = tally_store::from_config(&config.store)
        .await
        .context("failed to initialize view store")?;

    // Verify connectivity before accepting requests; catches path and
    // permission problems early.
    store
        .health_check()
        .await
        .context("store health check failed")?;
    tracing::info!("View store initialized");

    // Create application state
    let state = AppState::new(config.clone(), store.clone());

    // Spawn rate limiter cleanup task if rate limiting is enabled
    if let Some(cleanup_interval) = state.rate_limit_cleanup_interval() {
        let rate_limit_state = state.rate_limit.clone();
        tally_server::ratelimit::spawn_cleanup_task(rate_limit_state, cleanup_interval);
        tracing::info!(
            interval_secs = cleanup_interval.as_secs(),
            "Rate limiter cleanup task spawned"
        );
    }

    // Spawn the archiver if enabled
    let shutdown = CancellationToken::new();
    let archiver_handle = if config.archive.enabled {
        let archiver = Archiver::new(
            store.clone(),
            config.archive.interval(),
            config.archive.retention_days,
            shutdown.clone(),
        );
        let handle = archiver.spawn();
        tracing::info!(
            interval_secs = config.archive.interval_secs,
            retention_days = config.archive.retention_days,
            "Archiver spawned"
        );
        Some(handle)
    } else {
        tracing::info!("Archiver disabled");
        None
    };

    // Create router
    let app = create_router(state);

    // Parse bind address
    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    tracing::info!("Listening on {}", addr);

    // Start server with ConnectInfo for client IP extraction
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    let server_shutdown = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        server_shutdown.cancel();
    })
    .await?;

    // Stop the archiver cleanly before exiting
    if let Some(handle) = archiver_handle {
        shutdown.cancel();
        let _ = handle.await;
    }

    Ok(())
}

/// Wait for ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
