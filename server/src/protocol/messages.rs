//! Wire messages exchanged between learners and the server.
//!
//! Both directions are closed enums tagged by `"type"`, e.g.
//!
//! ```json
//! {"type": "action_move", "agent_id": "alice", "action": 3, "state_id": 0}
//! ```
//!
//! Inbound integers are signed so out-of-range values reach validation
//! and come back as `invalid_action` / `invalid_state` errors rather than
//! decode failures.

use engine_core::StateId;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ProtocolError};
use crate::session::EpisodeSummary;

/// Client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Join {
        agent_id: String,
    },
    Leave {
        agent_id: String,
    },
    GetState {
        agent_id: String,
    },
    GetAvailableActions {
        agent_id: String,
        state_id: i64,
    },
    GetAvailableRewards {
        agent_id: String,
        state_id: i64,
    },
    /// Move from `state_id`, which the client asserts is current.
    ActionMove {
        agent_id: String,
        action: i64,
        state_id: i64,
    },
    ActionRewardReport {
        agent_id: String,
        action: i64,
        reward: f64,
        next_state_id: i64,
    },
    FinalState {
        agent_id: String,
        is_terminal: bool,
        cumulative_reward: f64,
        steps_this_episode: u32,
    },
    Reset {
        agent_id: String,
    },
    /// Parallel arrays; all three must have the same length.
    QUpdate {
        agent_id: String,
        state_ids: Vec<i64>,
        action_indices: Vec<i64>,
        q_values: Vec<f64>,
    },
    VUpdate {
        agent_id: String,
        state_ids: Vec<i64>,
        v_values: Vec<f64>,
    },
    Info {
        agent_id: String,
        cumulative_reward: f64,
        steps_this_episode: u32,
        total_episodes: u32,
        successful_episodes: u32,
    },
    /// The learner is done; its session is removed.
    TrainingComplete {
        agent_id: String,
    },
}

impl Request {
    pub fn agent_id(&self) -> &str {
        match self {
            Request::Join { agent_id }
            | Request::Leave { agent_id }
            | Request::GetState { agent_id }
            | Request::GetAvailableActions { agent_id, .. }
            | Request::GetAvailableRewards { agent_id, .. }
            | Request::ActionMove { agent_id, .. }
            | Request::ActionRewardReport { agent_id, .. }
            | Request::FinalState { agent_id, .. }
            | Request::Reset { agent_id }
            | Request::QUpdate { agent_id, .. }
            | Request::VUpdate { agent_id, .. }
            | Request::Info { agent_id, .. }
            | Request::TrainingComplete { agent_id } => agent_id,
        }
    }

    /// Wire tag, also used as the metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Join { .. } => "join",
            Request::Leave { .. } => "leave",
            Request::GetState { .. } => "get_state",
            Request::GetAvailableActions { .. } => "get_available_actions",
            Request::GetAvailableRewards { .. } => "get_available_rewards",
            Request::ActionMove { .. } => "action_move",
            Request::ActionRewardReport { .. } => "action_reward_report",
            Request::FinalState { .. } => "final_state",
            Request::Reset { .. } => "reset",
            Request::QUpdate { .. } => "q_update",
            Request::VUpdate { .. } => "v_update",
            Request::Info { .. } => "info",
            Request::TrainingComplete { .. } => "training_complete",
        }
    }
}

/// Server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Joined {
        agent_id: String,
        created: bool,
        active_sessions: usize,
    },
    Left {
        agent_id: String,
        removed: bool,
        active_sessions: usize,
    },
    State {
        state_id: StateId,
    },
    AvailableActions {
        state_id: StateId,
        actions: Vec<u8>,
    },
    /// Aligned with the `actions` of the matching `available_actions`.
    AvailableRewards {
        state_id: StateId,
        rewards: Vec<f64>,
    },
    ActionReward {
        action: u8,
        reward: f64,
        next_state_id: StateId,
    },
    FinalState(EpisodeSummary),
    Reset {
        state_id: StateId,
    },
    Info(EpisodeSummary),
    TrainingComplete {
        message: String,
        total_episodes: u32,
        successful_episodes: u32,
    },
    Error {
        kind: ErrorKind,
        error_message: String,
    },
}

impl Response {
    pub fn error(err: &ProtocolError) -> Self {
        Response::Error {
            kind: err.kind(),
            error_message: err.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

/// Decode one inbound message.
pub fn decode_request(raw: &str) -> Result<Request, ProtocolError> {
    serde_json::from_str(raw).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
}
