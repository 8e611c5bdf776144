// ABOUTME: SSH transport for device CLI sessions.
// ABOUTME: Supports password, agent and key authentication with known_hosts verification.

mod client;
mod error;

pub use client::{Session, SessionConfig};
pub use error::{Error, Result};
