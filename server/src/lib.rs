//! Multi-agent puddle world training server.
//!
//! Each connected learner gets an [`AgentSession`]: its own grid world,
//! a server-side copy of its value tables and the episode counters. The
//! [`ProtocolHandler`] validates and dispatches the tagged JSON messages
//! learners send, and [`app::create_app`] exposes it over HTTP.

pub mod app;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod types;

pub use app::{create_app, AppState};
pub use error::{ErrorKind, ProtocolError};
pub use protocol::{decode_request, ProtocolHandler, Request, Response};
pub use registry::{normalize_agent_id, SessionHandle, SessionRegistry};
pub use session::{
    AgentSession, Conclusion, EpisodePhase, EpisodeSummary, SessionSettings, StepOutcome,
    TerminationPolicy, TerminationReason,
};
