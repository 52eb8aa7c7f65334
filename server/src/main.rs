//! Puddle world server binary.
//!
//! Loads configuration, checks that the configured world can actually be
//! built, and serves the protocol over HTTP until Ctrl+C.

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use engine_config::load_config;
use puddle_server::{create_app, metrics, AppState, SessionRegistry, SessionSettings};

/// Creates a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.common.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.validate().context("Invalid configuration")?;
    info!(
        "World: {}x{} grid, {} hazards of size {}, max {} steps x {} episodes, stop_method={}",
        config.world.grid_size,
        config.world.grid_size,
        config.world.max_hazards,
        config.world.hazard_size,
        config.episode.max_steps_per_episode,
        config.episode.max_episodes,
        config.episode.stop_method
    );

    let registry = Arc::new(SessionRegistry::new(SessionSettings::from(&config)));
    registry
        .preflight()
        .context("Configured world cannot be built")?;

    metrics::init_metrics();

    let app = create_app(Arc::new(AppState::new(Arc::clone(&registry))));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.clear();
    info!("Server shut down gracefully");
    Ok(())
}
