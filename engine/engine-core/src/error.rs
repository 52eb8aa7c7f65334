//! Error type shared by the grid simulation and the value tables.

use thiserror::Error;

/// Failures raised by [`GridEnvironment`](crate::GridEnvironment) and
/// [`ValueStore`](crate::ValueStore).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Invalid action: {0}")]
    InvalidAction(i64),

    #[error("State {state} out of range (world has {num_states} states)")]
    StateOutOfRange { state: i64, num_states: usize },

    #[error("Value must be finite, got {0}")]
    NonFiniteValue(f64),

    #[error(
        "Cannot place {requested} hazards of size {hazard_size} on a {grid_size}x{grid_size} grid \
         (placed {placed} after {rounds} rounds)"
    )]
    HazardPlacementInfeasible {
        requested: usize,
        placed: usize,
        hazard_size: usize,
        grid_size: usize,
        rounds: u32,
    },

    #[error("Invalid world: {0}")]
    InvalidWorld(String),
}
