// ABOUTME: Run error types with SNAFU pattern.
// ABOUTME: Wraps component failures and classifies them for programmatic handling.

use snafu::Snafu;

use crate::catalog::CatalogError;
use crate::device::FactsError;
use crate::janitor::JanitorError;
use crate::registry::RegistryError;
use crate::repository::RepositoryError;
use crate::session::SessionError;
use crate::transfer::TransferFailure;
use crate::verify::VerifyError;

/// A fatal condition that ended a run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RunError {
    #[snafu(display("unsupported device context: {reason}"))]
    Unsupported { reason: String },

    #[snafu(display("failed to read device facts: {source}"))]
    Facts { source: FactsError },

    #[snafu(display("image catalog \"{list}\" unavailable: {source}"))]
    CatalogList { list: String, source: RegistryError },

    #[snafu(display("{source}"))]
    Catalog { source: CatalogError },

    #[snafu(display("repository list \"{list}\" unavailable: {source}"))]
    RepositoryList { list: String, source: RegistryError },

    #[snafu(display("{source}"))]
    Repository { source: RepositoryError },

    #[snafu(display("integrity check of {filename} failed: {source}"))]
    Verify { filename: String, source: VerifyError },

    #[snafu(display("old image cleanup failed: {source}"))]
    Cleanup { source: JanitorError },

    #[snafu(display("insufficient free space on {}", areas.join(", ")))]
    InsufficientSpace { areas: Vec<String> },

    #[snafu(display("{source}"))]
    Transfer { source: TransferFailure },

    #[snafu(display("secondary copy to {area} failed: {source}"))]
    SecondaryCopy { area: String, source: SessionError },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunErrorKind {
    /// Unsupported device context or mode. Never retried.
    Precondition,
    /// Catalog, repository or hash lookup failed.
    Lookup,
    /// Not enough free space for the target image(s).
    Capacity,
    /// The transfer state machine ended in `Failed`.
    Transfer,
    /// The device session or facts source failed.
    Device,
}

impl RunError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> RunErrorKind {
        match self {
            RunError::Unsupported { .. } => RunErrorKind::Precondition,
            RunError::Cleanup { source } => match source {
                JanitorError::AciMode | JanitorError::UnknownRunningBuild => RunErrorKind::Precondition,
                JanitorError::Session(_) => RunErrorKind::Device,
            },
            RunError::CatalogList { .. }
            | RunError::Catalog { .. }
            | RunError::RepositoryList { .. }
            | RunError::Repository { .. } => RunErrorKind::Lookup,
            RunError::Verify { source, .. } => match source {
                VerifyError::MissingHash(_) => RunErrorKind::Lookup,
                VerifyError::Session(_) => RunErrorKind::Device,
            },
            RunError::InsufficientSpace { .. } => RunErrorKind::Capacity,
            RunError::Transfer { .. } => RunErrorKind::Transfer,
            RunError::Facts { .. } | RunError::SecondaryCopy { .. } => RunErrorKind::Device,
        }
    }

    /// Returns the failure reason name if this is a transfer failure.
    pub fn reason_name(&self) -> Option<&'static str> {
        match self {
            RunError::Transfer { source } => Some(source.reason.name()),
            _ => None,
        }
    }
}
