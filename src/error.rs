// ABOUTME: Application-wide error types for imgxfer.
// ABOUTME: Uses thiserror for ergonomic error handling.

use crate::registry::RegistryError;
use crate::run::RunError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("device {0} is not in the configuration")]
    UnknownDevice(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("SSH to {host} failed: {source}")]
    Ssh {
        host: String,
        #[source]
        source: crate::ssh::Error,
    },

    #[error("{host}: {source}")]
    Run {
        host: String,
        #[source]
        source: RunError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
