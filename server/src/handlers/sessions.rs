//! Session admission and listing.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::app::AppState;
use crate::error::ProtocolError;
use crate::types::{AgentRequest, JoinResponse, LeaveResponse, SessionOverview, SessionsResponse};

fn status_for(err: &ProtocolError) -> StatusCode {
    match err {
        ProtocolError::MalformedMessage(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Register a session for an agent.
pub async fn join(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AgentRequest>,
) -> Result<Json<JoinResponse>, (StatusCode, String)> {
    let registry = state.handler.registry();
    let joined = registry
        .add_session(&req.agent_id)
        .map_err(|e| (status_for(&e), e.to_string()))?;
    Ok(Json(JoinResponse {
        joined,
        agent_id: req.agent_id.trim().to_string(),
        active_sessions: registry.active_count(),
    }))
}

/// Remove an agent's session.
pub async fn leave(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AgentRequest>,
) -> Json<LeaveResponse> {
    let registry = state.handler.registry();
    let left = registry.remove_session(&req.agent_id);
    Json(LeaveResponse {
        left,
        agent_id: req.agent_id.trim().to_string(),
        active_sessions: registry.active_count(),
    })
}

/// List registered sessions and where each one stands.
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionsResponse> {
    let registry = state.handler.registry();
    let agents = registry
        .agent_ids()
        .into_iter()
        .filter_map(|id| {
            let handle = registry.get_session(&id)?;
            let session = handle.lock();
            Some(SessionOverview {
                agent_id: id,
                state_id: session.current_state(),
                phase: session.phase(),
                steps_this_episode: session.steps_this_episode(),
                total_episodes: session.episode_index(),
                successful_episodes: session.successful_episodes(),
            })
        })
        .collect::<Vec<_>>();
    Json(SessionsResponse {
        active_sessions: agents.len(),
        agents,
    })
}
