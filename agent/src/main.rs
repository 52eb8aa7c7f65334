//! Puddle agent - tabular Q-learning client for the puddle world server
//!
//! A process that:
//! 1. Joins the server under its agent id
//! 2. Plays episodes epsilon-greedily, learning Q and V tables locally
//! 3. Reports every updated value back to the server
//! 4. Writes running stats to `<data_dir>/stats/<agent_id>_stats.json`

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

mod config;
mod learner;
mod policy;
mod stats;
mod transport;

use crate::config::{central_config, Config};
use crate::learner::Learner;
use crate::stats::AgentStats;
use crate::transport::{HttpTransport, LocalTransport, Transport};
use engine_core::START_STATE;
use puddle_server::{ProtocolHandler, SessionRegistry, SessionSettings};

fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}

/// Progress bar over the configured episode count, only when stderr is a TTY.
fn progress_bar(episodes: u32) -> Option<ProgressBar> {
    if episodes == 0 || !std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        return None;
    }
    let pb = ProgressBar::new(episodes as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} episodes ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    Some(pb)
}

fn build_transport(config: &Config) -> Result<Box<dyn Transport>> {
    if config.local {
        let central = central_config();
        central.validate()?;
        let registry = SessionRegistry::new(SessionSettings::from(central));
        registry.preflight()?;
        info!("Training against an in-process server");
        Ok(Box::new(LocalTransport::new(Arc::new(ProtocolHandler::new(
            Arc::new(registry),
        )))))
    } else {
        info!("Training against {}", config.server_url);
        Ok(Box::new(HttpTransport::new(config.rl_endpoint())))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    config.validate()?;

    init_tracing(&config.log_level)?;
    info!(log_level = %config.log_level, "Tracing initialized");
    info!(
        agent_id = %config.agent_id,
        alpha = config.alpha,
        gamma = config.gamma,
        epsilon = config.epsilon,
        "Starting agent"
    );

    let transport = build_transport(&config)?;
    let stats = Arc::new(AgentStats::new(config.stats_path(), &config.agent_id));

    // Setup graceful shutdown
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);
    let shutdown_handle = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, stopping agent...");
            shutdown_flag.store(true, Ordering::Relaxed);
        }
    });

    let mut learner = Learner::new(&config, transport, Arc::clone(&stats), shutdown);
    if let Some(pb) = progress_bar(central_config().episode.max_episodes) {
        learner = learner.with_progress(pb);
    }

    let run_result = learner.run().await;
    shutdown_handle.abort();

    match run_result {
        Ok(summary) => {
            info!(
                "Agent finished: {} episodes, {} successful (epsilon {:.3}, V(start) {:.3})",
                summary.episodes,
                summary.successful_episodes,
                summary.epsilon,
                learner.values().get_v(START_STATE).unwrap_or_default()
            );
            if !summary.completed {
                info!("Stopped before the server reported training complete");
            }
            info!("Stats written to {}", stats.stats_path().display());
            Ok(())
        }
        Err(e) => {
            error!("Agent failed: {}", e);
            Err(e)
        }
    }
}
