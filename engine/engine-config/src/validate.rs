//! Startup validation for a loaded configuration.

use crate::{PuddleConfig, StopMethod};
use thiserror::Error;

/// A configuration value the server or agent cannot run with.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("world.grid_size must be at least 2, got {0}")]
    GridTooSmall(usize),

    #[error("world.hazard_size must be between 1 and grid_size ({grid_size}), got {hazard_size}")]
    HazardSize { hazard_size: usize, grid_size: usize },

    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("{field} must be in {range}, got {value}")]
    OutOfRange {
        field: &'static str,
        range: &'static str,
        value: f64,
    },

    #[error("{0} must be greater than 0")]
    Zero(&'static str),

    #[error("{0} cannot be empty")]
    Empty(&'static str),
}

fn finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonFinite { field, value })
    }
}

fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            range: "[0, 1]",
            value,
        })
    }
}

impl PuddleConfig {
    /// Check every section for values that would make the world or the
    /// learning math ill-defined. Called once at startup; an error is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let world = &self.world;
        if world.grid_size < 2 {
            return Err(ConfigError::GridTooSmall(world.grid_size));
        }
        if world.hazard_size == 0 || world.hazard_size > world.grid_size {
            return Err(ConfigError::HazardSize {
                hazard_size: world.hazard_size,
                grid_size: world.grid_size,
            });
        }
        if world.placement_attempts == 0 {
            return Err(ConfigError::Zero("world.placement_attempts"));
        }
        finite("world.default_reward", world.default_reward)?;
        finite("world.hazard_reward", world.hazard_reward)?;
        finite("world.goal_reward", world.goal_reward)?;

        let episode = &self.episode;
        if episode.max_steps_per_episode == 0 {
            return Err(ConfigError::Zero("episode.max_steps_per_episode"));
        }
        if episode.max_episodes == 0 {
            return Err(ConfigError::Zero("episode.max_episodes"));
        }
        finite(
            "episode.success_reward_threshold",
            episode.success_reward_threshold,
        )?;
        if episode.stop_method == StopMethod::Probabilistic {
            unit_interval("episode.stop_probability", episode.stop_probability)?;
        }

        let learning = &self.learning;
        if !(learning.alpha > 0.0 && learning.alpha <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "learning.alpha",
                range: "(0, 1]",
                value: learning.alpha,
            });
        }
        unit_interval("learning.gamma", learning.gamma)?;
        unit_interval("learning.epsilon", learning.epsilon)?;
        unit_interval("learning.epsilon_decay", learning.epsilon_decay)?;
        unit_interval("learning.min_epsilon", learning.min_epsilon)?;

        if self.agent.agent_id.trim().is_empty() {
            return Err(ConfigError::Empty("agent.agent_id"));
        }

        Ok(())
    }
}
