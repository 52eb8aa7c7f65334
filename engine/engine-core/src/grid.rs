//! Puddle world grid simulation.
//!
//! Geometry, transitions and rewards for an `N x N` grid. State ids are
//! row-major (`row * N + col`), the start is state 0 and the goal is the
//! bottom-right cell `N * N - 1`.

use crate::action::Action;
use crate::error::EngineError;
use crate::hazards::{is_valid_placement, place_hazards, Hazard};
use engine_config::WorldConfig;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::debug;

/// Row-major cell index.
pub type StateId = usize;

/// Every episode starts in the top-left cell.
pub const START_STATE: StateId = 0;

/// Reward constants, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardScheme {
    pub default_reward: f64,
    pub hazard_reward: f64,
    pub goal_reward: f64,
}

impl From<&WorldConfig> for RewardScheme {
    fn from(config: &WorldConfig) -> Self {
        Self {
            default_reward: config.default_reward,
            hazard_reward: config.hazard_reward,
            goal_reward: config.goal_reward,
        }
    }
}

/// Outcome of applying one action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub next_state: StateId,
    pub reward: f64,
    /// True when `next_state` is the goal.
    pub terminal: bool,
}

#[derive(Debug, Clone)]
enum Layout {
    /// Re-rolled on every reset.
    Random { count: usize, attempts_per_round: u32 },
    /// Restored verbatim on every reset.
    Fixed(Vec<Hazard>),
}

/// One agent's private copy of the world.
#[derive(Debug, Clone)]
pub struct GridEnvironment {
    grid_size: usize,
    hazard_size: usize,
    rewards: RewardScheme,
    layout: Layout,
    hazards: Vec<Hazard>,
    rng: ChaCha20Rng,
}

impl GridEnvironment {
    /// Build a world with randomly placed hazards.
    ///
    /// # Errors
    /// [`EngineError::InvalidWorld`] for an unusable geometry or non-finite
    /// rewards, [`EngineError::HazardPlacementInfeasible`] when the
    /// requested hazards cannot be packed.
    pub fn new(config: &WorldConfig, rng: ChaCha20Rng) -> Result<Self, EngineError> {
        check_world(config)?;
        let mut env = Self {
            grid_size: config.grid_size,
            hazard_size: config.hazard_size,
            rewards: RewardScheme::from(config),
            layout: Layout::Random {
                count: config.max_hazards,
                attempts_per_round: config.placement_attempts,
            },
            hazards: Vec::new(),
            rng,
        };
        env.reset()?;
        Ok(env)
    }

    /// Build a world with a fixed hazard layout that survives resets.
    ///
    /// The layout is checked against the same rules random placement
    /// follows; a hazard on the start cell, over the goal, out of bounds,
    /// overlapping another or not `config.hazard_size` wide is rejected.
    pub fn with_hazards(config: &WorldConfig, hazards: Vec<Hazard>) -> Result<Self, EngineError> {
        check_world(config)?;
        for (i, hazard) in hazards.iter().enumerate() {
            if hazard.size != config.hazard_size {
                return Err(EngineError::InvalidWorld(format!(
                    "hazard at ({}, {}) has size {}, world hazard size is {}",
                    hazard.row, hazard.col, hazard.size, config.hazard_size
                )));
            }
            if !is_valid_placement(hazard, &hazards[..i], config.grid_size) {
                return Err(EngineError::InvalidWorld(format!(
                    "hazard at ({}, {}) of size {} violates placement rules",
                    hazard.row, hazard.col, hazard.size
                )));
            }
        }
        Ok(Self {
            grid_size: config.grid_size,
            hazard_size: config.hazard_size,
            rewards: RewardScheme::from(config),
            layout: Layout::Fixed(hazards.clone()),
            hazards,
            rng: ChaCha20Rng::seed_from_u64(0),
        })
    }

    #[inline]
    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    #[inline]
    pub fn num_states(&self) -> usize {
        self.grid_size * self.grid_size
    }

    #[inline]
    pub fn goal_state(&self) -> StateId {
        self.num_states() - 1
    }

    pub fn hazard_size(&self) -> usize {
        self.hazard_size
    }

    pub fn rewards(&self) -> &RewardScheme {
        &self.rewards
    }

    pub fn hazards(&self) -> &[Hazard] {
        &self.hazards
    }

    /// Split a state id into `(row, col)`.
    #[inline]
    pub fn coords(&self, state: StateId) -> (usize, usize) {
        (state / self.grid_size, state % self.grid_size)
    }

    #[inline]
    pub fn state_at(&self, row: usize, col: usize) -> StateId {
        row * self.grid_size + col
    }

    /// Validate a state id received from outside (e.g. off the wire).
    pub fn check_state(&self, state: i64) -> Result<StateId, EngineError> {
        usize::try_from(state)
            .ok()
            .filter(|s| *s < self.num_states())
            .ok_or(EngineError::StateOutOfRange {
                state,
                num_states: self.num_states(),
            })
    }

    fn ensure_state(&self, state: StateId) -> Result<(), EngineError> {
        if state < self.num_states() {
            Ok(())
        } else {
            Err(EngineError::StateOutOfRange {
                state: state as i64,
                num_states: self.num_states(),
            })
        }
    }

    /// Apply a unit move, clamping at the grid edges.
    pub fn transition(&self, state: StateId, action: Action) -> Result<StateId, EngineError> {
        self.ensure_state(state)?;
        let (row, col) = self.coords(state);
        let (dr, dc) = action.delta();
        let max = self.grid_size as isize - 1;
        let next_row = (row as isize + dr).clamp(0, max) as usize;
        let next_col = (col as isize + dc).clamp(0, max) as usize;
        Ok(self.state_at(next_row, next_col))
    }

    /// Reward for landing on `next_state`. Goal beats hazard beats step cost.
    pub fn reward(&self, _state: StateId, _action: Action, next_state: StateId) -> f64 {
        if next_state == self.goal_state() {
            self.rewards.goal_reward
        } else if self.is_hazard(next_state) {
            self.rewards.hazard_reward
        } else {
            self.rewards.default_reward
        }
    }

    /// Transition and reward in one call.
    pub fn step(&self, state: StateId, action: Action) -> Result<Transition, EngineError> {
        let next_state = self.transition(state, action)?;
        Ok(Transition {
            next_state,
            reward: self.reward(state, action, next_state),
            terminal: self.is_terminal(next_state),
        })
    }

    /// Actions that actually move the agent, in code order.
    ///
    /// Edge moves that would be no-ops are excluded, so a corner yields
    /// exactly two actions.
    pub fn available_actions(&self, state: StateId) -> Result<Vec<Action>, EngineError> {
        self.ensure_state(state)?;
        let (row, col) = self.coords(state);
        let last = self.grid_size - 1;
        Ok(Action::ALL
            .into_iter()
            .filter(|action| match action {
                Action::Up => row > 0,
                Action::Down => row < last,
                Action::Left => col > 0,
                Action::Right => col < last,
            })
            .collect())
    }

    /// Reward of each available action, aligned with [`available_actions`].
    ///
    /// [`available_actions`]: GridEnvironment::available_actions
    pub fn available_rewards(&self, state: StateId) -> Result<Vec<f64>, EngineError> {
        self.available_actions(state)?
            .into_iter()
            .map(|action| {
                let next = self.transition(state, action)?;
                Ok(self.reward(state, action, next))
            })
            .collect()
    }

    pub fn is_action_available(&self, state: StateId, action: Action) -> bool {
        self.available_actions(state)
            .map(|actions| actions.contains(&action))
            .unwrap_or(false)
    }

    /// Whether the cell lies inside any hazard. Out-of-range ids are not.
    pub fn is_hazard(&self, state: StateId) -> bool {
        if state >= self.num_states() {
            return false;
        }
        let (row, col) = self.coords(state);
        self.hazards.iter().any(|h| h.contains(row, col))
    }

    /// Only the goal cell is terminal.
    #[inline]
    pub fn is_terminal(&self, state: StateId) -> bool {
        state == self.goal_state()
    }

    /// Clear and re-place the hazards and return the start state.
    ///
    /// Equivalent to constructing a fresh world with the same parameters.
    pub fn reset(&mut self) -> Result<StateId, EngineError> {
        self.hazards = match &self.layout {
            Layout::Random {
                count,
                attempts_per_round,
            } => place_hazards(
                self.grid_size,
                self.hazard_size,
                *count,
                *attempts_per_round,
                &mut self.rng,
            )?,
            Layout::Fixed(hazards) => hazards.clone(),
        };
        debug!(hazards = ?self.hazards, "World reset");
        Ok(START_STATE)
    }

    /// Drop all hazards; used when a session is torn down.
    pub fn clear_hazards(&mut self) {
        self.hazards.clear();
    }

    /// ASCII picture of the board: `S` start, `G` goal, `~` hazard, `A` agent.
    pub fn render(&self, agent: StateId) -> String {
        let mut out = String::with_capacity(self.num_states() + self.grid_size);
        for row in 0..self.grid_size {
            for col in 0..self.grid_size {
                let state = self.state_at(row, col);
                let cell = if state == agent {
                    'A'
                } else if state == self.goal_state() {
                    'G'
                } else if state == START_STATE {
                    'S'
                } else if self.is_hazard(state) {
                    '~'
                } else {
                    '.'
                };
                out.push(cell);
            }
            out.push('\n');
        }
        out
    }
}

fn check_world(config: &WorldConfig) -> Result<(), EngineError> {
    if config.grid_size < 2 {
        return Err(EngineError::InvalidWorld(format!(
            "grid size must be at least 2, got {}",
            config.grid_size
        )));
    }
    for (name, value) in [
        ("default_reward", config.default_reward),
        ("hazard_reward", config.hazard_reward),
        ("goal_reward", config.goal_reward),
    ] {
        if !value.is_finite() {
            return Err(EngineError::InvalidWorld(format!(
                "{name} must be finite, got {value}"
            )));
        }
    }
    Ok(())
}
