//! Request types for the HTTP API.

use serde::Deserialize;

/// Body of `POST /join` and `POST /leave`.
#[derive(Deserialize)]
pub struct AgentRequest {
    pub agent_id: String,
}
