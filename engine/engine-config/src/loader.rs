//! Configuration loading logic.
//!
//! Handles loading config from files and applying environment variable overrides.

use crate::PuddleConfig;
use std::path::Path;
use tracing::{debug, info, warn};

/// Standard locations to search for config.toml
pub const CONFIG_SEARCH_PATHS: &[&str] = &[
    "config.toml",      // Current directory
    "../config.toml",   // Parent directory (when running from a crate directory)
    "/app/config.toml", // Docker container
];

/// Load the central configuration from config.toml.
///
/// Searches for config.toml in the following order:
/// 1. Path specified by the PUDDLE_CONFIG environment variable
/// 2. Current directory (config.toml)
/// 3. Parent directory (../config.toml)
/// 4. Docker container path (/app/config.toml)
///
/// After loading, environment variable overrides are applied.
pub fn load_config() -> PuddleConfig {
    if let Ok(path) = std::env::var("PUDDLE_CONFIG") {
        let path = Path::new(&path);
        if path.exists() {
            info!("Loading config from PUDDLE_CONFIG: {}", path.display());
            return load_from_path(path);
        }
        warn!(
            "PUDDLE_CONFIG={} not found, searching defaults",
            path.display()
        );
    }

    for path_str in CONFIG_SEARCH_PATHS {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading config from {}", path.display());
            return load_from_path(path);
        }
    }

    debug!("No config.toml found, using built-in defaults");
    apply_env_overrides(PuddleConfig::default())
}

/// Load configuration from a specific path.
///
/// A file that cannot be read or parsed is logged and replaced by the
/// built-in defaults; env overrides apply either way.
pub fn load_from_path(path: &Path) -> PuddleConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => apply_env_overrides(config),
            Err(e) => {
                warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                apply_env_overrides(PuddleConfig::default())
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {}, using defaults", path.display(), e);
            apply_env_overrides(PuddleConfig::default())
        }
    }
}

/// Macro to reduce env override boilerplate
macro_rules! env_override {
    // String field
    ($config:expr, $section:ident . $field:ident, $key:expr) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = v;
        }
    };
    // Parseable field (usize, u32, f64, bool, StopMethod, ...)
    ($config:expr, $section:ident . $field:ident, $key:expr, parse) => {
        match std::env::var($key).map(|s| s.parse()) {
            Ok(Ok(v)) => $config.$section.$field = v,
            Ok(Err(_)) => warn!("Ignoring unparseable value for {}", $key),
            Err(_) => {}
        }
    };
    // Optional parseable field (Option<u64>, ...)
    ($config:expr, $section:ident . $field:ident, $key:expr, optional_parse) => {
        match std::env::var($key).map(|s| s.parse()) {
            Ok(Ok(v)) => $config.$section.$field = Some(v),
            Ok(Err(_)) => warn!("Ignoring unparseable value for {}", $key),
            Err(_) => {}
        }
    };
}

/// Apply environment variable overrides to a configuration.
///
/// Environment variables follow the pattern: PUDDLE_<SECTION>_<KEY>
pub fn apply_env_overrides(mut config: PuddleConfig) -> PuddleConfig {
    // Common
    env_override!(config, common.data_dir, "PUDDLE_COMMON_DATA_DIR");
    env_override!(config, common.log_level, "PUDDLE_COMMON_LOG_LEVEL");

    // World
    env_override!(config, world.grid_size, "PUDDLE_WORLD_GRID_SIZE", parse);
    env_override!(config, world.max_hazards, "PUDDLE_WORLD_MAX_HAZARDS", parse);
    env_override!(config, world.hazard_size, "PUDDLE_WORLD_HAZARD_SIZE", parse);
    env_override!(
        config,
        world.default_reward,
        "PUDDLE_WORLD_DEFAULT_REWARD",
        parse
    );
    env_override!(
        config,
        world.hazard_reward,
        "PUDDLE_WORLD_HAZARD_REWARD",
        parse
    );
    env_override!(config, world.goal_reward, "PUDDLE_WORLD_GOAL_REWARD", parse);
    env_override!(
        config,
        world.placement_attempts,
        "PUDDLE_WORLD_PLACEMENT_ATTEMPTS",
        parse
    );
    env_override!(config, world.seed, "PUDDLE_WORLD_SEED", optional_parse);

    // Episode
    env_override!(
        config,
        episode.max_steps_per_episode,
        "PUDDLE_EPISODE_MAX_STEPS_PER_EPISODE",
        parse
    );
    env_override!(
        config,
        episode.max_episodes,
        "PUDDLE_EPISODE_MAX_EPISODES",
        parse
    );
    env_override!(
        config,
        episode.success_reward_threshold,
        "PUDDLE_EPISODE_SUCCESS_REWARD_THRESHOLD",
        parse
    );
    env_override!(
        config,
        episode.stop_method,
        "PUDDLE_EPISODE_STOP_METHOD",
        parse
    );
    env_override!(
        config,
        episode.stop_probability,
        "PUDDLE_EPISODE_STOP_PROBABILITY",
        parse
    );
    env_override!(
        config,
        episode.discount_rewards,
        "PUDDLE_EPISODE_DISCOUNT_REWARDS",
        parse
    );

    // Learning
    env_override!(config, learning.alpha, "PUDDLE_LEARNING_ALPHA", parse);
    env_override!(config, learning.gamma, "PUDDLE_LEARNING_GAMMA", parse);
    env_override!(config, learning.epsilon, "PUDDLE_LEARNING_EPSILON", parse);
    env_override!(
        config,
        learning.epsilon_decay,
        "PUDDLE_LEARNING_EPSILON_DECAY",
        parse
    );
    env_override!(
        config,
        learning.min_epsilon,
        "PUDDLE_LEARNING_MIN_EPSILON",
        parse
    );
    env_override!(
        config,
        learning.random_q_init,
        "PUDDLE_LEARNING_RANDOM_Q_INIT",
        parse
    );

    // Server
    env_override!(config, server.host, "PUDDLE_SERVER_HOST");
    env_override!(config, server.port, "PUDDLE_SERVER_PORT", parse);

    // Agent
    env_override!(config, agent.agent_id, "PUDDLE_AGENT_AGENT_ID");
    env_override!(config, agent.server_url, "PUDDLE_AGENT_SERVER_URL");
    env_override!(
        config,
        agent.log_interval,
        "PUDDLE_AGENT_LOG_INTERVAL",
        parse
    );

    config
}
