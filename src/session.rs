// ABOUTME: Command session capability consumed by every device-facing component.
// ABOUTME: One command outstanding at a time; long-running variant for transfers.

use async_trait::async_trait;
use std::time::Duration;

/// Errors surfaced by a command session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// The transport reported a failure. The message is used for
    /// failure-signature matching, so adapters must keep the device text.
    #[error("session transport error: {0}")]
    Transport(String),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),
}

/// An authenticated CLI session against a single device.
#[async_trait]
pub trait CommandSession: Send + Sync {
    /// Send a command and return its text output, bounded by the session's
    /// default timeout.
    async fn send(&self, command: &str) -> Result<String, SessionError>;

    /// Send a command that may run far longer than ordinary commands.
    ///
    /// `terminator` is a regex marking the end of output; an empty string
    /// means "wait for the CLI prompt".
    async fn send_long(
        &self,
        command: &str,
        timeout: Duration,
        terminator: &str,
    ) -> Result<String, SessionError>;
}
