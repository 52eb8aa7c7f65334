//! Default configuration values loaded from config.defaults.toml.
//!
//! The defaults file is embedded at compile time so the binaries run with
//! sensible values even when no config.toml is present.

use once_cell::sync::Lazy;
use serde::Deserialize;

/// The embedded defaults TOML file (loaded at compile time)
const DEFAULTS_TOML: &str = include_str!("../../../config.defaults.toml");

/// Parsed defaults structure (parsed once at first use)
static DEFAULTS: Lazy<DefaultsConfig> = Lazy::new(|| {
    toml::from_str(DEFAULTS_TOML).expect("config.defaults.toml should be valid TOML")
});

// ============================================================================
// Internal structs for parsing config.defaults.toml
// ============================================================================

#[derive(Debug, Deserialize)]
struct DefaultsConfig {
    common: CommonDefaults,
    world: WorldDefaults,
    episode: EpisodeDefaults,
    learning: LearningDefaults,
    server: ServerDefaults,
    agent: AgentDefaults,
}

#[derive(Debug, Deserialize)]
struct CommonDefaults {
    data_dir: String,
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct WorldDefaults {
    grid_size: usize,
    max_hazards: usize,
    hazard_size: usize,
    default_reward: f64,
    hazard_reward: f64,
    goal_reward: f64,
    placement_attempts: u32,
}

#[derive(Debug, Deserialize)]
struct EpisodeDefaults {
    max_steps_per_episode: u32,
    max_episodes: u32,
    success_reward_threshold: f64,
    stop_method: String,
    stop_probability: f64,
    discount_rewards: bool,
}

#[derive(Debug, Deserialize)]
struct LearningDefaults {
    alpha: f64,
    gamma: f64,
    epsilon: f64,
    epsilon_decay: f64,
    min_epsilon: f64,
    random_q_init: bool,
}

#[derive(Debug, Deserialize)]
struct ServerDefaults {
    host: String,
    port: u16,
}

#[derive(Debug, Deserialize)]
struct AgentDefaults {
    agent_id: String,
    server_url: String,
    log_interval: u32,
}

// ============================================================================
// Public accessor functions
// ============================================================================

// Common
pub fn data_dir() -> &'static str {
    &DEFAULTS.common.data_dir
}
pub fn log_level() -> &'static str {
    &DEFAULTS.common.log_level
}

// World
pub fn grid_size() -> usize {
    DEFAULTS.world.grid_size
}
pub fn max_hazards() -> usize {
    DEFAULTS.world.max_hazards
}
pub fn hazard_size() -> usize {
    DEFAULTS.world.hazard_size
}
pub fn default_reward() -> f64 {
    DEFAULTS.world.default_reward
}
pub fn hazard_reward() -> f64 {
    DEFAULTS.world.hazard_reward
}
pub fn goal_reward() -> f64 {
    DEFAULTS.world.goal_reward
}
pub fn placement_attempts() -> u32 {
    DEFAULTS.world.placement_attempts
}

// Episode
pub fn max_steps_per_episode() -> u32 {
    DEFAULTS.episode.max_steps_per_episode
}
pub fn max_episodes() -> u32 {
    DEFAULTS.episode.max_episodes
}
pub fn success_reward_threshold() -> f64 {
    DEFAULTS.episode.success_reward_threshold
}
pub fn stop_method() -> &'static str {
    &DEFAULTS.episode.stop_method
}
pub fn stop_probability() -> f64 {
    DEFAULTS.episode.stop_probability
}
pub fn discount_rewards() -> bool {
    DEFAULTS.episode.discount_rewards
}

// Learning
pub fn alpha() -> f64 {
    DEFAULTS.learning.alpha
}
pub fn gamma() -> f64 {
    DEFAULTS.learning.gamma
}
pub fn epsilon() -> f64 {
    DEFAULTS.learning.epsilon
}
pub fn epsilon_decay() -> f64 {
    DEFAULTS.learning.epsilon_decay
}
pub fn min_epsilon() -> f64 {
    DEFAULTS.learning.min_epsilon
}
pub fn random_q_init() -> bool {
    DEFAULTS.learning.random_q_init
}

// Server
pub fn host() -> &'static str {
    &DEFAULTS.server.host
}
pub fn port() -> u16 {
    DEFAULTS.server.port
}

// Agent
pub fn agent_id() -> &'static str {
    &DEFAULTS.agent.agent_id
}
pub fn server_url() -> &'static str {
    &DEFAULTS.agent.server_url
}
pub fn log_interval() -> u32 {
    DEFAULTS.agent.log_interval
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse() {
        assert_eq!(data_dir(), "./data");
        assert_eq!(log_level(), "info");
    }

    #[test]
    fn test_world_defaults() {
        assert_eq!(grid_size(), 5);
        assert_eq!(max_hazards(), 2);
        assert_eq!(hazard_size(), 2);
        assert!((default_reward() - -0.01).abs() < f64::EPSILON);
        assert!((hazard_reward() - -1.0).abs() < f64::EPSILON);
        assert!((goal_reward() - 10.0).abs() < f64::EPSILON);
        assert_eq!(placement_attempts(), 1000);
    }

    #[test]
    fn test_episode_defaults() {
        assert_eq!(max_steps_per_episode(), 50);
        assert_eq!(max_episodes(), 100);
        assert_eq!(stop_method(), "step_limit");
        assert!((stop_probability() - 0.1).abs() < f64::EPSILON);
        assert!(!discount_rewards());
    }

    #[test]
    fn test_learning_defaults() {
        assert!((alpha() - 0.1).abs() < f64::EPSILON);
        assert!((gamma() - 0.9).abs() < f64::EPSILON);
        assert!((epsilon() - 1.0).abs() < f64::EPSILON);
        assert!(random_q_init());
    }
}
