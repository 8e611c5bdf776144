// ABOUTME: SSH-specific error types.
// ABOUTME: Covers connection, authentication, host key and interactive shell failures.

use crate::session::SessionError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: no valid credentials")]
    AuthenticationFailed,

    #[error("SSH agent not available: {0}")]
    AgentUnavailable(String),

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("interactive shell failed: {0}")]
    Shell(String),

    #[error("invalid output terminator {pattern:?}: {reason}")]
    Terminator { pattern: String, reason: String },

    #[error("command timed out after {0:?}")]
    CommandTimeout(std::time::Duration),

    #[error("channel closed before the device returned a prompt")]
    ChannelClosed,

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    Key(#[from] russh::keys::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for SessionError {
    fn from(err: Error) -> Self {
        match err {
            Error::CommandTimeout(after) => SessionError::Timeout(after),
            other => SessionError::Transport(other.to_string()),
        }
    }
}
