//! HTTP surface of the server.
//!
//! Endpoints:
//! - POST /rl       - One protocol message, answered with its responses
//! - POST /join     - Register a session for an agent
//! - POST /leave    - Remove an agent's session
//! - GET  /sessions - List registered sessions
//! - GET  /health   - Health check
//! - GET  /metrics  - Prometheus metrics

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::handlers::{health, join, leave, list_sessions, metrics_handler, rl_message};
use crate::protocol::ProtocolHandler;
use crate::registry::SessionRegistry;
use crate::session::SessionSettings;

/// Shared application state
pub struct AppState {
    pub handler: ProtocolHandler,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            handler: ProtocolHandler::new(registry),
        }
    }

    pub fn from_settings(settings: SessionSettings) -> Self {
        Self::new(Arc::new(SessionRegistry::new(settings)))
    }
}

/// Create the application router with the given state.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/rl", post(rl_message))
        .route("/join", post(join))
        .route("/leave", post(leave))
        .route("/sessions", get(list_sessions))
        .layer(cors)
        .with_state(state)
}

/// Application state for tests: a seeded 5x5 world without random stops.
#[cfg(test)]
pub fn create_test_state() -> Arc<AppState> {
    let mut settings = SessionSettings::default();
    settings.world.seed = Some(42);
    settings.world.grid_size = 5;
    settings.episode.max_steps_per_episode = 50;
    settings.episode.max_episodes = 3;
    settings.learning.random_q_init = false;
    Arc::new(AppState::from_settings(settings))
}
