//! Protocol-level failures and their wire classification.

use engine_core::{Action, EngineError, StateId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Everything that can go wrong while serving one request.
///
/// Each variant is confined to the exchange that produced it and is sent
/// back to the client as an `error` response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("No session for agent {0:?}")]
    SessionNotFound(String),

    #[error("State ID mismatch: request claims {claimed}, session is at {current}")]
    StateMismatch { claimed: i64, current: StateId },

    #[error("Invalid action index: {0}")]
    InvalidAction(i64),

    #[error("Action {action} is not available in state {state}")]
    UnavailableAction { action: Action, state: StateId },

    #[error("Invalid state ID: {0}")]
    InvalidState(i64),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Episode is terminal; no further actions until the next episode starts")]
    EpisodeTerminal,

    #[error("Training is complete")]
    TrainingComplete,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Stable, machine-readable error classification carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SessionNotFound,
    StateMismatch,
    InvalidAction,
    InvalidState,
    MalformedMessage,
    EpisodeTerminal,
    TrainingComplete,
    HazardPlacementInfeasible,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SessionNotFound => "session_not_found",
            ErrorKind::StateMismatch => "state_mismatch",
            ErrorKind::InvalidAction => "invalid_action",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::MalformedMessage => "malformed_message",
            ErrorKind::EpisodeTerminal => "episode_terminal",
            ErrorKind::TrainingComplete => "training_complete",
            ErrorKind::HazardPlacementInfeasible => "hazard_placement_infeasible",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::SessionNotFound(_) => ErrorKind::SessionNotFound,
            ProtocolError::StateMismatch { .. } => ErrorKind::StateMismatch,
            ProtocolError::InvalidAction(_) | ProtocolError::UnavailableAction { .. } => {
                ErrorKind::InvalidAction
            }
            ProtocolError::InvalidState(_) => ErrorKind::InvalidState,
            ProtocolError::MalformedMessage(_) => ErrorKind::MalformedMessage,
            ProtocolError::EpisodeTerminal => ErrorKind::EpisodeTerminal,
            ProtocolError::TrainingComplete => ErrorKind::TrainingComplete,
            ProtocolError::Engine(e) => match e {
                EngineError::InvalidAction(_) => ErrorKind::InvalidAction,
                EngineError::StateOutOfRange { .. } => ErrorKind::InvalidState,
                EngineError::NonFiniteValue(_) => ErrorKind::MalformedMessage,
                EngineError::HazardPlacementInfeasible { .. } => {
                    ErrorKind::HazardPlacementInfeasible
                }
                EngineError::InvalidWorld(_) => ErrorKind::Internal,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_protocol_kinds() {
        let err: ProtocolError = EngineError::InvalidAction(7).into();
        assert_eq!(err.kind(), ErrorKind::InvalidAction);
        assert_eq!(err.to_string(), "Invalid action: 7");

        let err: ProtocolError = EngineError::StateOutOfRange {
            state: 30,
            num_states: 25,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn unavailable_action_is_an_invalid_action() {
        let err = ProtocolError::UnavailableAction {
            action: Action::Up,
            state: 0,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidAction);
        assert_eq!(err.to_string(), "Action UP is not available in state 0");
    }

    #[test]
    fn kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&ErrorKind::StateMismatch).unwrap();
        assert_eq!(json, "\"state_mismatch\"");
        assert_eq!(ErrorKind::StateMismatch.to_string(), "state_mismatch");
    }
}
