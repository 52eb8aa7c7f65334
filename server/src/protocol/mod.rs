//! The message protocol between learners and the server.

mod handler;
mod messages;

pub use handler::ProtocolHandler;
pub use messages::{decode_request, Request, Response};
