// ABOUTME: Retry state machine driving transfer + verification for one image.
// ABOUTME: Retries recoverable causes within a budget and cleans partial files between attempts.

use super::cause::{FailureCause, FailureReason, TransferFailure};
use super::executor::{Executor, ImageSource, classify_session_error};
use crate::catalog::ImageRecord;
use crate::device::{DeviceFacts, FactsSource};
use crate::dialect::dialect_for;
use crate::session::CommandSession;
use crate::verify::{Verifier, VerifyError};
use std::time::Duration;

/// Knobs for one transfer sequence.
#[derive(Debug, Clone, Copy)]
pub struct TransferSettings {
    pub timeout: Duration,
    /// Ceiling for the on-device hash after each copy.
    pub verify_timeout: Duration,
    /// Extra attempts after the first. Zero means a single pass.
    pub max_retries: u32,
    pub dry_run: bool,
}

/// States of a transfer sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    Attempting,
    Retrying,
    Success,
    Failed(FailureReason),
}

/// Result of a completed sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub attempts: u32,
}

enum AttemptError {
    Cause(FailureCause),
    Unhandled(String),
}

/// Drives one image through Attempting -> (Retrying ->)* Success | Failed.
pub struct RetryController<'a, S, F> {
    session: &'a S,
    executor: Executor<'a, S, F>,
    verifier: Verifier<'a, S>,
    settings: TransferSettings,
}

impl<'a, S: CommandSession, F: FactsSource> RetryController<'a, S, F> {
    pub fn new(session: &'a S, facts: &'a F, settings: TransferSettings) -> Self {
        Self {
            session,
            executor: Executor::new(session, facts, settings.timeout, settings.dry_run),
            verifier: Verifier::new(session, settings.verify_timeout, settings.dry_run),
            settings,
        }
    }

    /// Transfer and verify `image`, retrying recoverable failures.
    pub async fn run(
        &self,
        device: &DeviceFacts,
        source: &ImageSource,
        image: &ImageRecord,
    ) -> Result<TransferReport, TransferFailure> {
        let mut remaining = self.settings.max_retries;
        let mut attempts = 0u32;
        let mut state = RetryState::Attempting;

        loop {
            state = match state {
                RetryState::Attempting | RetryState::Retrying => {
                    attempts += 1;
                    match self.attempt(device, source, image).await {
                        Ok(()) => RetryState::Success,
                        Err(AttemptError::Unhandled(detail)) => {
                            RetryState::Failed(FailureReason::Unhandled(detail))
                        }
                        Err(AttemptError::Cause(cause)) => {
                            self.after_failure(cause, &mut remaining, device, image).await
                        }
                    }
                }
                RetryState::Success => {
                    tracing::info!("  Transfer of {} complete after {attempts} attempt(s)", image.filename);
                    return Ok(TransferReport { attempts });
                }
                RetryState::Failed(reason) => {
                    tracing::error!("  Transfer of {} failed: {reason}", image.filename);
                    return Err(TransferFailure {
                        filename: image.filename.clone(),
                        reason,
                        attempts,
                    });
                }
            };
        }
    }

    async fn attempt(
        &self,
        device: &DeviceFacts,
        source: &ImageSource,
        image: &ImageRecord,
    ) -> Result<(), AttemptError> {
        self.executor
            .execute(device, source, image)
            .await
            .map_err(AttemptError::Cause)?;

        match self.verifier.verify(device, image).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AttemptError::Cause(FailureCause::IntegrityCheckFailed)),
            Err(VerifyError::Session(e)) => Err(AttemptError::Cause(classify_session_error(&e))),
            Err(e @ VerifyError::MissingHash(_)) => Err(AttemptError::Unhandled(e.to_string())),
        }
    }

    async fn after_failure(
        &self,
        cause: FailureCause,
        remaining: &mut u32,
        device: &DeviceFacts,
        image: &ImageRecord,
    ) -> RetryState {
        if !cause.is_retryable() {
            return RetryState::Failed(FailureReason::Cause(cause));
        }

        let budget = self.settings.max_retries;
        if *remaining == 0 {
            // A single pass reports the cause itself rather than exhaustion.
            return if budget == 0 {
                RetryState::Failed(FailureReason::Cause(cause))
            } else {
                RetryState::Failed(FailureReason::MaxAttemptsReached)
            };
        }
        *remaining -= 1;
        tracing::info!("  ({}/{budget}) retrying transfer", budget - *remaining);

        match self.remove_partial(device, image).await {
            Ok(()) => RetryState::Retrying,
            Err(cause) => RetryState::Failed(FailureReason::Cause(cause)),
        }
    }

    async fn remove_partial(&self, device: &DeviceFacts, image: &ImageRecord) -> Result<(), FailureCause> {
        let cmd = dialect_for(device.os).delete_partial_command(&device.system_fs, &image.filename);
        if self.settings.dry_run {
            tracing::info!("dry-run cmd: {cmd}");
            return Ok(());
        }
        tracing::debug!("removing partial file: {cmd}");
        self.session.send(&cmd).await.map(|_| ()).map_err(|e| {
            tracing::error!("could not remove partial file {}: {e}", image.filename);
            classify_session_error(&e)
        })
    }
}
