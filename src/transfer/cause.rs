// ABOUTME: Closed failure-cause taxonomy for image transfers.
// ABOUTME: Each cause has a stable code and exactly one retry policy.

use std::fmt;

/// Why a transfer attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCause {
    /// Unrecognized failure signature.
    GeneralError,
    /// Broken pipe or read error mid-transfer.
    InterruptedTransfer,
    /// Byte count on the device differs from the expected size.
    IncompleteTransfer,
    /// Hash verification returned a mismatch.
    IntegrityCheckFailed,
    /// Repository refused, unreachable, unresolvable, or file missing.
    HostUnresponsiveOrNotFound,
    /// The session itself failed with no device-side signal.
    ApiError,
}

impl FailureCause {
    /// Stable numeric code.
    pub fn code(self) -> u8 {
        match self {
            FailureCause::GeneralError => 0x00,
            FailureCause::InterruptedTransfer => 0x3f,
            FailureCause::HostUnresponsiveOrNotFound => 0x7f,
            FailureCause::IncompleteTransfer => 0xbf,
            FailureCause::IntegrityCheckFailed => 0xdf,
            FailureCause::ApiError => 0xff,
        }
    }

    pub fn is_retryable(self) -> bool {
        match self {
            FailureCause::GeneralError
            | FailureCause::InterruptedTransfer
            | FailureCause::IncompleteTransfer
            | FailureCause::IntegrityCheckFailed => true,
            FailureCause::HostUnresponsiveOrNotFound | FailureCause::ApiError => false,
        }
    }

    /// Reason name reported when a run fails on this cause.
    pub fn reason_name(self) -> &'static str {
        match self {
            FailureCause::GeneralError => "GENERAL_ERROR",
            FailureCause::InterruptedTransfer => "INTERRUPTED_TRANSFER",
            FailureCause::IncompleteTransfer => "INCOMPLETE_TRANSFER",
            FailureCause::IntegrityCheckFailed => "INTEGRITY_CHECK_FAILED",
            FailureCause::HostUnresponsiveOrNotFound => "NOTCONNECT_OR_FILENOTEXIST",
            FailureCause::ApiError => "API_ERROR",
        }
    }

    fn description(self) -> &'static str {
        match self {
            FailureCause::GeneralError => "general error",
            FailureCause::InterruptedTransfer => "broken pipe",
            FailureCause::IncompleteTransfer => "incomplete transfer",
            FailureCause::IntegrityCheckFailed => "integrity check failed",
            FailureCause::HostUnresponsiveOrNotFound => "host unresponsive or file not found",
            FailureCause::ApiError => "API error",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x} - {}", self.code(), self.description())
    }
}

/// Terminal reason of a failed transfer sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Cause(FailureCause),
    MaxAttemptsReached,
    /// An error outside the transfer taxonomy (e.g. a missing hash).
    Unhandled(String),
}

impl FailureReason {
    pub fn name(&self) -> &'static str {
        match self {
            FailureReason::Cause(cause) => cause.reason_name(),
            FailureReason::MaxAttemptsReached => "MAX_ATTEMPTS_REACHED",
            FailureReason::Unhandled(_) => "UNHANDLED_EXCEPTION",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Unhandled(detail) => write!(f, "{}: {detail}", self.name()),
            _ => f.write_str(self.name()),
        }
    }
}

/// A transfer sequence that ended in the `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transfer of {filename} failed ({reason})")]
pub struct TransferFailure {
    pub filename: String,
    pub reason: FailureReason,
    pub attempts: u32,
}
