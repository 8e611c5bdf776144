// ABOUTME: Transfer executor: issues one copy and classifies the result.
// ABOUTME: Falls back to an on-device size check when no failure is signalled.

use super::cause::FailureCause;
use crate::catalog::ImageRecord;
use crate::device::{DeviceFacts, FactsSource};
use crate::dialect::{dialect_for, is_host_signature};
use crate::session::{CommandSession, SessionError};
use std::time::Duration;

/// Default ceiling for a single copy.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(40 * 60);

/// Repository the image is pulled from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub address: String,
    /// Normalized directory path: empty, or a leading slash and no trailing slash.
    pub path: String,
}

impl ImageSource {
    pub fn new(address: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            path: path.into(),
        }
    }

    pub fn url(&self, filename: &str) -> String {
        format!("http://{}{}/{}", self.address, self.path, filename)
    }
}

/// Map a session-level error to a failure cause.
pub fn classify_session_error(err: &SessionError) -> FailureCause {
    match err {
        SessionError::Timeout(_) => FailureCause::ApiError,
        SessionError::Transport(msg) => {
            if is_host_signature(msg) {
                FailureCause::HostUnresponsiveOrNotFound
            } else if msg.contains("Signature not valid") {
                FailureCause::InterruptedTransfer
            } else {
                FailureCause::ApiError
            }
        }
    }
}

/// Issues a single copy of an image to the device's default storage area.
pub struct Executor<'a, S, F> {
    session: &'a S,
    facts: &'a F,
    timeout: Duration,
    dry_run: bool,
}

impl<'a, S: CommandSession, F: FactsSource> Executor<'a, S, F> {
    pub fn new(session: &'a S, facts: &'a F, timeout: Duration, dry_run: bool) -> Self {
        Self {
            session,
            facts,
            timeout,
            dry_run,
        }
    }

    /// Copy `image` from `source` and confirm it landed with the expected size.
    pub async fn execute(
        &self,
        device: &DeviceFacts,
        source: &ImageSource,
        image: &ImageRecord,
    ) -> Result<(), FailureCause> {
        let dialect = dialect_for(device.os);
        let cmd = dialect.copy_command(&source.url(&image.filename), &device.system_fs, &image.filename);

        tracing::info!("  Starting transfer. Waiting for return prompt ...");
        if self.dry_run {
            tracing::info!("dry-run cmd: {}", cmd.trim_end());
            return Ok(());
        }

        let signalled = match self.session.send_long(&cmd, self.timeout, "").await {
            Ok(output) => {
                tracing::debug!(output = %output, "copy returned");
                dialect.classify_copy_output(&output)
            }
            Err(e) => {
                tracing::debug!(error = %e, "copy raised a session error");
                Some(classify_session_error(&e))
            }
        };
        tracing::info!("  Prompt returned. Validating status ...");

        let result = match signalled {
            Some(cause) => Err(cause),
            None => self.confirm_size(device, image).await,
        };

        match result {
            Ok(()) => tracing::info!("  [PASS] Transfer completed"),
            Err(cause) => tracing::info!("  [FAIL] Reason: [{cause}]"),
        }
        result
    }

    async fn confirm_size(&self, device: &DeviceFacts, image: &ImageRecord) -> Result<(), FailureCause> {
        let size = self
            .facts
            .file_size(&device.system_fs, &image.filename)
            .await
            .map_err(|e| {
                tracing::error!("post-transfer size query failed: {e}");
                FailureCause::ApiError
            })?;

        // A missing file counts as size -1.
        let actual = size.map(|s| s as i128).unwrap_or(-1);
        if actual != i128::from(image.size) {
            tracing::debug!(expected = image.size, actual, "byte count mismatch");
            return Err(FailureCause::IncompleteTransfer);
        }
        Ok(())
    }
}
