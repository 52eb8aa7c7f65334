//! HTTP request handlers.

mod health;
mod rl;
mod sessions;

pub use health::*;
pub use rl::*;
pub use sessions::*;
