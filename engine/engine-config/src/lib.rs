//! Centralized configuration loading from config.toml.
//!
//! This crate provides the configuration structs and loading logic shared
//! by the puddle world server and the learning agent.
//!
//! # Configuration Priority
//!
//! Settings are loaded with the following priority (highest to lowest):
//! 1. Environment variables (`PUDDLE_<SECTION>_<KEY>`)
//! 2. config.toml file
//! 3. Built-in defaults (`config.defaults.toml`, embedded at compile time)
//!
//! # Environment Variable Override Pattern
//!
//! ```text
//! PUDDLE_<SECTION>_<KEY>=value
//!
//! Examples:
//!     PUDDLE_WORLD_GRID_SIZE=8
//!     PUDDLE_WORLD_MAX_HAZARDS=4
//!     PUDDLE_EPISODE_STOP_METHOD=probabilistic
//!     PUDDLE_SERVER_PORT=3000
//!     PUDDLE_LEARNING_ALPHA=0.2
//! ```
//!
//! The loaded [`PuddleConfig`] is immutable once built; callers validate it
//! with [`PuddleConfig::validate`] and pass sections by reference into the
//! world and session constructors.

mod defaults;
mod loader;
mod structs;
mod validate;

pub use defaults::*;
pub use loader::{apply_env_overrides, load_config, load_from_path, CONFIG_SEARCH_PATHS};
pub use structs::*;
pub use validate::ConfigError;
