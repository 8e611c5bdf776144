// ABOUTME: Device entries: SSH connection settings plus the device profile.
// ABOUTME: Builds the SessionConfig used to open the CLI session.

use super::Secret;
use crate::device::DeviceProfile;
use crate::error::Result;
use crate::ssh::SessionConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: Option<Secret>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
    /// Accept and record unknown host keys.
    #[serde(default)]
    pub trust_first_connection: bool,
    #[serde(flatten)]
    pub profile: DeviceProfile,
}

fn default_port() -> u16 {
    22
}

impl DeviceConfig {
    /// SSH settings for this device. Resolves the password secret.
    pub fn session_config(&self, command_timeout: Duration) -> Result<SessionConfig> {
        let mut config = SessionConfig::new(&self.host, &self.user)
            .port(self.port)
            .trust_on_first_use(self.trust_first_connection)
            .command_timeout(command_timeout);
        if let Some(password) = &self.password {
            config = config.password(password.resolve()?);
        }
        if let Some(path) = &self.key_path {
            config = config.key_path(path);
        }
        if let Some(path) = &self.known_hosts {
            config = config.known_hosts_path(path);
        }
        Ok(config)
    }
}
