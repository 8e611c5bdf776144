// ABOUTME: Diagnostics accumulator for non-fatal warnings during a run.
// ABOUTME: Each warning names the device it came from and is printed after all devices finish.

use std::fmt;

/// Collects non-fatal warnings across device runs.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning and log it immediately.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(host = %warning.host, kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Warnings raised for one device.
    pub fn for_host<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a Warning> + 'a {
        self.warnings.iter().filter(move |w| w.host == host)
    }
}

/// A condition worth reporting that does not fail the device's run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub host: String,
    pub message: String,
}

impl Warning {
    fn new(kind: WarningKind, host: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            host: host.to_string(),
            message: message.into(),
        }
    }

    pub fn running_image_location(host: &str, message: impl Into<String>) -> Self {
        Self::new(WarningKind::RunningImageLocation, host, message)
    }

    /// Dry-run continued past a failed capacity check.
    pub fn insufficient_space(host: &str, message: impl Into<String>) -> Self {
        Self::new(WarningKind::InsufficientSpace, host, message)
    }

    pub fn ssh_disconnect(host: &str, message: impl Into<String>) -> Self {
        Self::new(WarningKind::SshDisconnect, host, message)
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.host, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// The running image is not on the default storage area.
    RunningImageLocation,
    InsufficientSpace,
    /// The SSH session did not close cleanly.
    SshDisconnect,
}
