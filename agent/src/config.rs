//! Configuration for the learning agent
//!
//! Defaults come from config.toml (with `PUDDLE_*` environment overrides)
//! through `engine-config`; CLI arguments take highest priority.

use anyhow::{anyhow, Result};
use clap::Parser;
use engine_config::{load_config, PuddleConfig};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

// Load central config once at startup
static CENTRAL_CONFIG: Lazy<PuddleConfig> = Lazy::new(load_config);

/// The central configuration the CLI defaults were drawn from.
pub fn central_config() -> &'static PuddleConfig {
    &CENTRAL_CONFIG
}

fn default_agent_id() -> String {
    CENTRAL_CONFIG.agent.agent_id.clone()
}

fn default_server_url() -> String {
    CENTRAL_CONFIG.agent.server_url.clone()
}

fn default_log_level() -> String {
    CENTRAL_CONFIG.common.log_level.clone()
}

fn default_log_interval() -> u32 {
    CENTRAL_CONFIG.agent.log_interval
}

fn default_data_dir() -> String {
    CENTRAL_CONFIG.common.data_dir.clone()
}

fn default_grid_size() -> usize {
    CENTRAL_CONFIG.world.grid_size
}

fn default_alpha() -> f64 {
    CENTRAL_CONFIG.learning.alpha
}

fn default_gamma() -> f64 {
    CENTRAL_CONFIG.learning.gamma
}

fn default_epsilon() -> f64 {
    CENTRAL_CONFIG.learning.epsilon
}

fn default_epsilon_decay() -> f64 {
    CENTRAL_CONFIG.learning.epsilon_decay
}

fn default_min_epsilon() -> f64 {
    CENTRAL_CONFIG.learning.min_epsilon
}

fn default_random_q_init() -> bool {
    CENTRAL_CONFIG.learning.random_q_init
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "puddle-agent")]
#[command(about = "Puddle world agent - tabular Q-learning client")]
#[command(
    long_about = "Agent that joins a puddle world server, plays episodes epsilon-greedily
and reports its Q/V updates back to the server.

Configuration is loaded from config.toml with environment variable overrides.
CLI arguments take highest priority."
)]
pub struct Config {
    /// Agent identifier; also the session key on the server
    #[arg(long, default_value_t = default_agent_id())]
    pub agent_id: String,

    /// Base URL of the puddle world server
    #[arg(long, default_value_t = default_server_url())]
    pub server_url: String,

    /// Train against an in-process server built from the same configuration
    #[arg(long)]
    pub local: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value_t = default_log_level())]
    pub log_level: String,

    /// Log progress every N episodes (0 to disable)
    #[arg(long, default_value_t = default_log_interval())]
    pub log_interval: u32,

    /// Data directory for stats output
    #[arg(long, default_value_t = default_data_dir())]
    pub data_dir: String,

    /// Side length of the server's grid; sizes the local value tables
    #[arg(long, default_value_t = default_grid_size())]
    pub grid_size: usize,

    /// Learning rate
    #[arg(long, default_value_t = default_alpha())]
    pub alpha: f64,

    /// Discount factor
    #[arg(long, default_value_t = default_gamma())]
    pub gamma: f64,

    /// Initial exploration rate
    #[arg(long, default_value_t = default_epsilon())]
    pub epsilon: f64,

    /// Multiplier applied to epsilon after every episode
    #[arg(long, default_value_t = default_epsilon_decay())]
    pub epsilon_decay: f64,

    /// Floor for epsilon
    #[arg(long, default_value_t = default_min_epsilon())]
    pub min_epsilon: f64,

    /// Start the local Q-table at random values in [0, 1)
    #[arg(long, default_value_t = default_random_q_init(), action = clap::ArgAction::Set)]
    pub random_q_init: bool,

    /// Seed for action selection and table initialisation
    #[arg(long)]
    pub seed: Option<u64>,
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(anyhow!("{} must be within [0, 1], got {}", name, value))
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.agent_id.trim().is_empty() {
            return Err(anyhow!("agent_id cannot be empty"));
        }

        if !self.local
            && !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://"))
        {
            return Err(anyhow!(
                "server_url must start with http:// or https://, got '{}'",
                self.server_url
            ));
        }

        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(anyhow!(
                "invalid log level '{}', expected one of trace, debug, info, warn, error",
                self.log_level
            ));
        }

        if self.grid_size < 2 {
            return Err(anyhow!("grid_size must be at least 2"));
        }

        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(anyhow!("alpha must be within (0, 1], got {}", self.alpha));
        }
        check_unit("gamma", self.gamma)?;
        check_unit("epsilon", self.epsilon)?;
        check_unit("epsilon_decay", self.epsilon_decay)?;
        check_unit("min_epsilon", self.min_epsilon)?;

        Ok(())
    }

    pub fn num_states(&self) -> usize {
        self.grid_size * self.grid_size
    }

    /// Endpoint protocol messages are posted to.
    pub fn rl_endpoint(&self) -> String {
        format!("{}/rl", self.server_url.trim_end_matches('/'))
    }

    /// Path of the stats snapshot for this agent.
    pub fn stats_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
            .join("stats")
            .join(format!("{}_stats.json", self.agent_id.trim()))
    }
}
