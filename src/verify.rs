// ABOUTME: Integrity verifier: runs an on-device MD5 check of a transferred image.
// ABOUTME: A mismatch is a normal `false`; only a missing hash is an error.

use crate::catalog::ImageRecord;
use crate::device::DeviceFacts;
use crate::dialect::dialect_for;
use crate::session::{CommandSession, SessionError};
use std::time::Duration;

/// Hashing a large image on slow flash can take many minutes.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("MD5 hash for {0} is not in the catalog")]
    MissingHash(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Verifies image integrity on the device.
pub struct Verifier<'a, S> {
    session: &'a S,
    timeout: Duration,
    dry_run: bool,
}

impl<'a, S: CommandSession> Verifier<'a, S> {
    pub fn new(session: &'a S, timeout: Duration, dry_run: bool) -> Self {
        Self {
            session,
            timeout,
            dry_run,
        }
    }

    /// Check `image` on the device's default storage area.
    pub async fn verify(&self, device: &DeviceFacts, image: &ImageRecord) -> Result<bool, VerifyError> {
        // SHA-512 support varies by release train; MD5 is the only digest checked.
        let Some(md5) = image.hash("md5") else {
            let err = VerifyError::MissingHash(image.filename.clone());
            tracing::error!("{err}");
            return Err(err);
        };

        tracing::info!("  Starting image integrity verification. Waiting for return prompt ...");
        let dialect = dialect_for(device.os);
        let cmd = dialect.verify_command(&device.system_fs, &image.filename, md5);

        if self.dry_run {
            tracing::info!("dry-run cmd: {cmd}");
            return Ok(true);
        }

        let output = self.session.send_long(&cmd, self.timeout, "").await?;
        tracing::debug!(output = ?output, "verification returned");

        let passed = dialect.verification_passed(&output, md5);
        if passed {
            tracing::info!("  [PASS] Integrity verification OK");
        } else {
            tracing::info!("  [FAIL] Integrity verification failed");
        }
        Ok(passed)
    }
}
