//! Core simulation types for the puddle world.
//!
//! This crate provides the pure, I/O-free building blocks the server and
//! the learning agent share:
//! - `Action`: the four unit moves and their fixed wire codes
//! - `GridEnvironment`: grid geometry, hazard layout, transitions, rewards
//! - `Hazard` / `place_hazards`: rejection-sampled hazard placement
//! - `ValueStore`: concurrently updatable Q- and V-tables

pub mod action;
pub mod error;
pub mod grid;
pub mod hazards;
pub mod values;

pub use action::Action;
pub use error::EngineError;
pub use grid::{GridEnvironment, RewardScheme, StateId, Transition, START_STATE};
pub use hazards::{place_hazards, Hazard, MAX_PLACEMENT_ROUNDS};
pub use values::{QRow, ValueStore};

#[cfg(test)]
mod grid_tests;
