//! The protocol endpoint.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::app::AppState;
use crate::protocol::Response;

/// `POST /rl`: one protocol message in, its ordered responses out.
///
/// The body is taken as a raw string so that undecodable messages still get
/// a protocol `error` response instead of an HTTP rejection.
pub async fn rl_message(State(state): State<Arc<AppState>>, body: String) -> Json<Vec<Response>> {
    Json(state.handler.handle_json(&body))
}
