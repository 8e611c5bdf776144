// ABOUTME: Image transfer: failure taxonomy, single-copy executor, retry controller.
// ABOUTME: The retry controller is the only entry point the orchestrator uses.

mod cause;
mod executor;
mod retry;

pub use cause::{FailureCause, FailureReason, TransferFailure};
pub use executor::{DEFAULT_TRANSFER_TIMEOUT, Executor, ImageSource, classify_session_error};
pub use retry::{RetryController, RetryState, TransferReport, TransferSettings};
