//! Response types for the HTTP API.

use serde::{Deserialize, Serialize};

use crate::session::EpisodePhase;

/// Health check response.
#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_sessions: usize,
}

#[derive(Serialize, Deserialize)]
pub struct JoinResponse {
    /// False if the agent already had a session.
    pub joined: bool,
    pub agent_id: String,
    pub active_sessions: usize,
}

#[derive(Serialize, Deserialize)]
pub struct LeaveResponse {
    /// False if there was no session to remove.
    pub left: bool,
    pub agent_id: String,
    pub active_sessions: usize,
}

/// One registered session as listed by `GET /sessions`.
#[derive(Serialize, Deserialize)]
pub struct SessionOverview {
    pub agent_id: String,
    pub state_id: usize,
    pub phase: EpisodePhase,
    pub steps_this_episode: u32,
    pub total_episodes: u32,
    pub successful_episodes: u32,
}

#[derive(Serialize, Deserialize)]
pub struct SessionsResponse {
    pub active_sessions: usize,
    pub agents: Vec<SessionOverview>,
}
