//! Configuration struct definitions.
//!
//! All config structs with serde deserialization support and default values.

use crate::defaults;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Serde default functions (required for #[serde(default = "...")])
// These call the accessor functions from defaults module
// ============================================================================

fn d_data_dir() -> String {
    defaults::data_dir().into()
}
fn d_log_level() -> String {
    defaults::log_level().into()
}
fn d_grid_size() -> usize {
    defaults::grid_size()
}
fn d_max_hazards() -> usize {
    defaults::max_hazards()
}
fn d_hazard_size() -> usize {
    defaults::hazard_size()
}
fn d_default_reward() -> f64 {
    defaults::default_reward()
}
fn d_hazard_reward() -> f64 {
    defaults::hazard_reward()
}
fn d_goal_reward() -> f64 {
    defaults::goal_reward()
}
fn d_placement_attempts() -> u32 {
    defaults::placement_attempts()
}
fn d_max_steps() -> u32 {
    defaults::max_steps_per_episode()
}
fn d_max_episodes() -> u32 {
    defaults::max_episodes()
}
fn d_success_threshold() -> f64 {
    defaults::success_reward_threshold()
}
fn d_stop_method() -> StopMethod {
    defaults::stop_method().parse().unwrap_or_default()
}
fn d_stop_probability() -> f64 {
    defaults::stop_probability()
}
fn d_discount_rewards() -> bool {
    defaults::discount_rewards()
}
fn d_alpha() -> f64 {
    defaults::alpha()
}
fn d_gamma() -> f64 {
    defaults::gamma()
}
fn d_epsilon() -> f64 {
    defaults::epsilon()
}
fn d_epsilon_decay() -> f64 {
    defaults::epsilon_decay()
}
fn d_min_epsilon() -> f64 {
    defaults::min_epsilon()
}
fn d_random_q_init() -> bool {
    defaults::random_q_init()
}
fn d_host() -> String {
    defaults::host().into()
}
fn d_port() -> u16 {
    defaults::port()
}
fn d_agent_id() -> String {
    defaults::agent_id().into()
}
fn d_server_url() -> String {
    defaults::server_url().into()
}
fn d_log_interval() -> u32 {
    defaults::log_interval()
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Root configuration structure matching config.toml
#[derive(Debug, Deserialize, Default, Clone)]
pub struct PuddleConfig {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub episode: EpisodeConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Common configuration shared by all components
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CommonConfig {
    #[serde(default = "d_data_dir")]
    pub data_dir: String,
    #[serde(default = "d_log_level")]
    pub log_level: String,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir().into(),
            log_level: defaults::log_level().into(),
        }
    }
}

/// Grid geometry, hazard layout and reward constants.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorldConfig {
    /// Side length N of the square grid (N*N states)
    #[serde(default = "d_grid_size")]
    pub grid_size: usize,
    /// Number of hazard squares placed on every reset
    #[serde(default = "d_max_hazards")]
    pub max_hazards: usize,
    /// Side length of each hazard square
    #[serde(default = "d_hazard_size")]
    pub hazard_size: usize,
    /// Step cost for an ordinary move
    #[serde(default = "d_default_reward")]
    pub default_reward: f64,
    /// Reward for landing inside a hazard
    #[serde(default = "d_hazard_reward")]
    pub hazard_reward: f64,
    /// Reward for reaching the goal cell
    #[serde(default = "d_goal_reward")]
    pub goal_reward: f64,
    /// Rejection-sampling budget for a single placement round
    #[serde(default = "d_placement_attempts")]
    pub placement_attempts: u32,
    /// Fixed RNG seed; sessions derive their own seed from it when set
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            grid_size: defaults::grid_size(),
            max_hazards: defaults::max_hazards(),
            hazard_size: defaults::hazard_size(),
            default_reward: defaults::default_reward(),
            hazard_reward: defaults::hazard_reward(),
            goal_reward: defaults::goal_reward(),
            placement_attempts: defaults::placement_attempts(),
            seed: None,
        }
    }
}

/// How an episode may end besides reaching the goal.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopMethod {
    /// Goal or step cap
    #[default]
    StepLimit,
    /// Goal only; `max_steps_per_episode` is ignored
    GoalReached,
    /// Goal, step cap, or a stop with `stop_probability` after every step
    Probabilistic,
}

impl FromStr for StopMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "step_limit" => Ok(StopMethod::StepLimit),
            "goal_reached" => Ok(StopMethod::GoalReached),
            "probabilistic" => Ok(StopMethod::Probabilistic),
            other => Err(format!("unknown stop method '{}'", other)),
        }
    }
}

impl fmt::Display for StopMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopMethod::StepLimit => write!(f, "step_limit"),
            StopMethod::GoalReached => write!(f, "goal_reached"),
            StopMethod::Probabilistic => write!(f, "probabilistic"),
        }
    }
}

/// Episode budget and termination settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EpisodeConfig {
    #[serde(default = "d_max_steps")]
    pub max_steps_per_episode: u32,
    /// Episodes per session before training is complete
    #[serde(default = "d_max_episodes")]
    pub max_episodes: u32,
    /// Cumulative reward at or above which an episode counts as a success
    #[serde(default = "d_success_threshold")]
    pub success_reward_threshold: f64,
    #[serde(default = "d_stop_method")]
    pub stop_method: StopMethod,
    /// Per-step stop chance, only used with `StopMethod::Probabilistic`
    #[serde(default = "d_stop_probability")]
    pub stop_probability: f64,
    /// Discount each step's reward by gamma^(step-1) in the cumulative total
    #[serde(default = "d_discount_rewards")]
    pub discount_rewards: bool,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            max_steps_per_episode: defaults::max_steps_per_episode(),
            max_episodes: defaults::max_episodes(),
            success_reward_threshold: defaults::success_reward_threshold(),
            stop_method: d_stop_method(),
            stop_probability: defaults::stop_probability(),
            discount_rewards: defaults::discount_rewards(),
        }
    }
}

/// Learning-rate and exploration parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LearningConfig {
    #[serde(default = "d_alpha")]
    pub alpha: f64,
    #[serde(default = "d_gamma")]
    pub gamma: f64,
    #[serde(default = "d_epsilon")]
    pub epsilon: f64,
    /// Multiplicative epsilon decay applied after each episode (1.0 disables)
    #[serde(default = "d_epsilon_decay")]
    pub epsilon_decay: f64,
    #[serde(default = "d_min_epsilon")]
    pub min_epsilon: f64,
    /// Seed Q-tables with uniform [0, 1) values instead of zeros
    #[serde(default = "d_random_q_init")]
    pub random_q_init: bool,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            alpha: defaults::alpha(),
            gamma: defaults::gamma(),
            epsilon: defaults::epsilon(),
            epsilon_decay: defaults::epsilon_decay(),
            min_epsilon: defaults::min_epsilon(),
            random_q_init: defaults::random_q_init(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::host().into(),
            port: defaults::port(),
        }
    }
}

/// Learning agent configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    #[serde(default = "d_agent_id")]
    pub agent_id: String,
    #[serde(default = "d_server_url")]
    pub server_url: String,
    #[serde(default = "d_log_interval")]
    pub log_interval: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: defaults::agent_id().into(),
            server_url: defaults::server_url().into(),
            log_interval: defaults::log_interval(),
        }
    }
}
