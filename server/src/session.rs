//! Per-agent session and episode state machine.
//!
//! An [`AgentSession`] couples one connected agent to its own
//! [`GridEnvironment`] and the server's [`ValueStore`] for that agent, and
//! tracks the episode counters the protocol reports back.
//!
//! The phase is bookkeeping for observers (`/sessions`, logs). Only
//! `Terminal` and `TrainingComplete` gate what a session accepts.
//!
//! ```text
//! Idle -> AwaitingAction -> AwaitingNextState -> ... -> Terminal -> Idle
//!                                                          \
//!                                                           -> TrainingComplete
//! ```

use engine_config::{EpisodeConfig, LearningConfig, PuddleConfig, StopMethod, WorldConfig};
use engine_core::{Action, GridEnvironment, StateId, ValueStore, START_STATE};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ProtocolError;

/// Immutable settings every session is built from.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub world: WorldConfig,
    pub episode: EpisodeConfig,
    pub learning: LearningConfig,
}

impl From<&PuddleConfig> for SessionSettings {
    fn from(config: &PuddleConfig) -> Self {
        Self {
            world: config.world.clone(),
            episode: config.episode.clone(),
            learning: config.learning.clone(),
        }
    }
}

/// How an episode may end besides reaching the goal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TerminationPolicy {
    /// Goal or `max_steps_per_episode`.
    StepLimit,
    /// Goal only. Episodes have no step cap.
    GoalOnly,
    /// Goal, step cap, or after every step past the first a stop with this
    /// probability.
    Probabilistic { stop_probability: f64 },
}

impl TerminationPolicy {
    pub fn from_config(episode: &EpisodeConfig) -> Self {
        match episode.stop_method {
            StopMethod::StepLimit => TerminationPolicy::StepLimit,
            StopMethod::GoalReached => TerminationPolicy::GoalOnly,
            StopMethod::Probabilistic => TerminationPolicy::Probabilistic {
                stop_probability: episode.stop_probability,
            },
        }
    }

    fn has_step_cap(&self) -> bool {
        !matches!(self, TerminationPolicy::GoalOnly)
    }
}

/// Why an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    GoalReached,
    StepLimit,
    RandomStop,
}

/// Where a session is in its episode loop.
///
/// Informational except for `Terminal` and `TrainingComplete`:
/// [`AgentSession::take_action`] is accepted from `Idle`,
/// `AwaitingAction` and `AwaitingNextState` alike. Stale moves are
/// rejected by the protocol's state-id check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodePhase {
    /// Fresh episode, no state sent yet.
    Idle,
    /// The client holds the current state and is expected to move.
    AwaitingAction,
    /// A move was applied; the next-state bundle has not gone out yet.
    AwaitingNextState,
    /// The episode ended and has not been concluded.
    Terminal,
    /// All episodes are done; the session only answers queries.
    TrainingComplete,
}

/// Result of one applied action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub action: Action,
    pub reward: f64,
    pub next_state: StateId,
    pub termination: Option<TerminationReason>,
}

/// Episode counters as reported on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub state_id: StateId,
    pub is_terminal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<TerminationReason>,
    pub steps_this_episode: u32,
    pub cumulative_reward: f64,
    pub success: bool,
    pub total_episodes: u32,
    pub successful_episodes: u32,
}

/// What concluding an episode produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Conclusion {
    pub summary: EpisodeSummary,
    pub training_complete: bool,
}

pub struct AgentSession {
    agent_id: String,
    env: GridEnvironment,
    values: Arc<ValueStore>,
    policy: TerminationPolicy,
    max_steps: u32,
    max_episodes: u32,
    success_threshold: f64,
    /// `Some(gamma)` when cumulative rewards are discounted.
    discount: Option<f64>,
    rng: ChaCha20Rng,

    current_state: StateId,
    last_reward: f64,
    is_terminal: bool,
    termination: Option<TerminationReason>,
    steps_this_episode: u32,
    cumulative_reward: f64,
    episode_index: u32,
    successful_episodes: u32,
    phase: EpisodePhase,
    last_summary: Option<EpisodeSummary>,
}

impl AgentSession {
    /// Create a session with a randomly laid out world.
    ///
    /// The world and the Q-table initialisation draw from `rng`, so a seeded
    /// generator yields a reproducible session.
    pub fn new(
        agent_id: impl Into<String>,
        settings: &SessionSettings,
        mut rng: ChaCha20Rng,
    ) -> Result<Self, ProtocolError> {
        let env = GridEnvironment::new(&settings.world, ChaCha20Rng::seed_from_u64(rng.gen()))?;
        Ok(Self::with_environment(agent_id, env, settings, rng))
    }

    /// Create a session around an existing world.
    pub fn with_environment(
        agent_id: impl Into<String>,
        env: GridEnvironment,
        settings: &SessionSettings,
        mut rng: ChaCha20Rng,
    ) -> Self {
        let values = if settings.learning.random_q_init {
            ValueStore::with_random_q(env.num_states(), &mut rng)
        } else {
            ValueStore::new(env.num_states())
        };
        Self {
            agent_id: agent_id.into(),
            values: Arc::new(values),
            policy: TerminationPolicy::from_config(&settings.episode),
            max_steps: settings.episode.max_steps_per_episode,
            max_episodes: settings.episode.max_episodes,
            success_threshold: settings.episode.success_reward_threshold,
            discount: settings
                .episode
                .discount_rewards
                .then_some(settings.learning.gamma),
            rng,
            current_state: START_STATE,
            last_reward: 0.0,
            is_terminal: false,
            termination: None,
            steps_this_episode: 0,
            cumulative_reward: 0.0,
            episode_index: 0,
            successful_episodes: 0,
            phase: EpisodePhase::Idle,
            last_summary: None,
            env,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn environment(&self) -> &GridEnvironment {
        &self.env
    }

    pub fn values(&self) -> &Arc<ValueStore> {
        &self.values
    }

    pub fn current_state(&self) -> StateId {
        self.current_state
    }

    pub fn last_reward(&self) -> f64 {
        self.last_reward
    }

    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }

    pub fn phase(&self) -> EpisodePhase {
        self.phase
    }

    pub fn steps_this_episode(&self) -> u32 {
        self.steps_this_episode
    }

    pub fn cumulative_reward(&self) -> f64 {
        self.cumulative_reward
    }

    /// Number of episodes concluded so far.
    pub fn episode_index(&self) -> u32 {
        self.episode_index
    }

    pub fn successful_episodes(&self) -> u32 {
        self.successful_episodes
    }

    pub fn is_training_complete(&self) -> bool {
        self.phase == EpisodePhase::TrainingComplete
    }

    /// Summary of the most recently concluded episode.
    pub fn last_summary(&self) -> Option<&EpisodeSummary> {
        self.last_summary.as_ref()
    }

    /// Apply one action from the current state.
    ///
    /// Accepted from any phase before `Terminal`; see [`EpisodePhase`].
    ///
    /// # Errors
    /// [`ProtocolError::EpisodeTerminal`] while the episode awaits
    /// conclusion and [`ProtocolError::TrainingComplete`] once all episodes
    /// are done. The session is left unchanged in both cases.
    pub fn take_action(&mut self, action: Action) -> Result<StepOutcome, ProtocolError> {
        match self.phase {
            EpisodePhase::Terminal => return Err(ProtocolError::EpisodeTerminal),
            EpisodePhase::TrainingComplete => return Err(ProtocolError::TrainingComplete),
            _ => {}
        }

        let step = self.env.step(self.current_state, action)?;
        self.steps_this_episode += 1;
        let weight = match self.discount {
            Some(gamma) => gamma.powi(self.steps_this_episode as i32 - 1),
            None => 1.0,
        };
        self.cumulative_reward += weight * step.reward;
        self.last_reward = step.reward;
        self.current_state = step.next_state;

        let termination = if step.terminal {
            Some(TerminationReason::GoalReached)
        } else if self.policy.has_step_cap() && self.steps_this_episode >= self.max_steps {
            Some(TerminationReason::StepLimit)
        } else if self.random_stop() {
            Some(TerminationReason::RandomStop)
        } else {
            None
        };

        debug!(
            agent_id = %self.agent_id,
            %action,
            next_state = step.next_state,
            reward = step.reward,
            step = self.steps_this_episode,
            "Action applied"
        );

        if termination.is_some() {
            self.is_terminal = true;
            self.termination = termination;
            self.phase = EpisodePhase::Terminal;
        } else {
            self.phase = EpisodePhase::AwaitingNextState;
        }

        Ok(StepOutcome {
            action,
            reward: step.reward,
            next_state: step.next_state,
            termination,
        })
    }

    fn random_stop(&mut self) -> bool {
        match self.policy {
            TerminationPolicy::Probabilistic { stop_probability } => {
                self.steps_this_episode > 1 && self.rng.gen::<f64>() < stop_probability
            }
            TerminationPolicy::StepLimit | TerminationPolicy::GoalOnly => false,
        }
    }

    /// Record that the client has been sent the current state bundle.
    pub fn mark_snapshot_sent(&mut self) {
        if matches!(
            self.phase,
            EpisodePhase::Idle | EpisodePhase::AwaitingNextState
        ) {
            self.phase = EpisodePhase::AwaitingAction;
        }
    }

    /// Count the finished episode and either start the next one or mark
    /// training complete.
    ///
    /// Only acts while the session is [`EpisodePhase::Terminal`]; any
    /// further call for the same termination returns `Ok(None)` without
    /// counting again.
    ///
    /// # Errors
    /// An engine error if the next world cannot be laid out. Nothing is
    /// counted in that case and the session stays `Terminal`, so the call
    /// can be retried.
    pub fn conclude_episode(&mut self) -> Result<Option<Conclusion>, ProtocolError> {
        if self.phase != EpisodePhase::Terminal {
            return Ok(None);
        }

        let training_complete = self.episode_index + 1 >= self.max_episodes;
        let next_start = if training_complete {
            None
        } else {
            Some(self.env.reset()?)
        };

        self.episode_index += 1;
        let success = self.cumulative_reward >= self.success_threshold;
        if success {
            self.successful_episodes += 1;
        }
        let summary = self.summary_with(success);

        info!(
            agent_id = %self.agent_id,
            episode = self.episode_index,
            steps = self.steps_this_episode,
            cumulative_reward = self.cumulative_reward,
            success,
            reason = ?self.termination,
            successful_episodes = self.successful_episodes,
            "Episode concluded"
        );
        self.last_summary = Some(summary.clone());

        match next_start {
            Some(state) => self.start_episode(state),
            None => {
                self.phase = EpisodePhase::TrainingComplete;
                info!(
                    agent_id = %self.agent_id,
                    episodes = self.episode_index,
                    successful_episodes = self.successful_episodes,
                    "Training complete"
                );
            }
        }

        Ok(Some(Conclusion {
            summary,
            training_complete,
        }))
    }

    /// Start a fresh episode: re-roll the world and clear per-episode
    /// counters. Episode totals are kept.
    pub fn reset_game(&mut self) -> Result<StateId, ProtocolError> {
        let state = self.env.reset()?;
        self.start_episode(state);
        Ok(state)
    }

    fn start_episode(&mut self, state: StateId) {
        self.current_state = state;
        self.steps_this_episode = 0;
        self.cumulative_reward = 0.0;
        self.last_reward = 0.0;
        self.is_terminal = false;
        self.termination = None;
        if self.phase != EpisodePhase::TrainingComplete {
            self.phase = EpisodePhase::Idle;
        }
    }

    /// Counters of the episode in progress.
    pub fn summary(&self) -> EpisodeSummary {
        self.summary_with(self.cumulative_reward >= self.success_threshold && self.is_terminal)
    }

    fn summary_with(&self, success: bool) -> EpisodeSummary {
        EpisodeSummary {
            state_id: self.current_state,
            is_terminal: self.is_terminal,
            reason: self.termination,
            steps_this_episode: self.steps_this_episode,
            cumulative_reward: self.cumulative_reward,
            success,
            total_episodes: self.episode_index,
            successful_episodes: self.successful_episodes,
        }
    }

    /// Release the world's hazards before the session is dropped.
    pub fn cleanup(&mut self) {
        self.env.clear_hazards();
        debug!(agent_id = %self.agent_id, "Session cleaned up");
    }
}
