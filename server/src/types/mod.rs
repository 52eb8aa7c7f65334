//! Request and response bodies for the HTTP convenience routes.
//!
//! The protocol messages themselves live in [`crate::protocol`].

mod requests;
mod responses;

pub use requests::*;
pub use responses::*;
