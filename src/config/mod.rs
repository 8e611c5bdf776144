// ABOUTME: Configuration types and parsing for imgxfer.yml.
// ABOUTME: Handles YAML parsing, discovery, validation and CLI overrides.

mod deserialize;
mod device;
mod init;
mod secret;

pub use deserialize::{OVERRIDE_PLACEHOLDER, PATH_PLACEHOLDER, normalize_repo_path, validate_override};
pub use device::DeviceConfig;
pub use init::init_config;
pub use secret::Secret;

use crate::device::OsFamily;
use crate::error::{Error, Result};
use crate::repository::{DEFAULT_REPOSITORY_LIST, RepositorySource};
use crate::run::{DEFAULT_SECONDARY_COPY_TIMEOUT, RunOptions};
use crate::transfer::DEFAULT_TRANSFER_TIMEOUT;
use crate::verify::DEFAULT_VERIFY_TIMEOUT;
use deserialize::{deserialize_devices, deserialize_override, deserialize_repo_path};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "imgxfer.yml";
pub const CONFIG_FILENAME_ALT: &str = "imgxfer.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".imgxfer/config.yml";

pub const DEFAULT_CATALOG: &str = "Cisco OS SW Hashes";
pub const DEFAULT_REGISTRY: &str = "registry.yml";
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Name of the image catalog list in the registry.
    #[serde(default = "default_catalog")]
    pub catalog: String,

    /// Registry file. Relative paths resolve against the config file.
    #[serde(default = "default_registry")]
    pub registry: PathBuf,

    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub cleanup: CleanupConfig,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub debug: bool,

    #[serde(deserialize_with = "deserialize_devices")]
    pub devices: NonEmpty<DeviceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub region: String,

    /// Registry list holding the regional repositories.
    #[serde(default = "default_repository_list")]
    pub list: String,

    /// Fixed repository address; skips regional selection.
    #[serde(default, rename = "override", deserialize_with = "deserialize_override")]
    pub override_address: Option<String>,

    #[serde(default, deserialize_with = "deserialize_repo_path")]
    pub path: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            list: default_repository_list(),
            override_address: None,
            path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_transfer_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Ceiling for on-device integrity verification.
    #[serde(default = "default_verify_timeout", with = "humantime_serde")]
    pub verify_timeout: Duration,

    #[serde(default = "default_secondary_copy_timeout", with = "humantime_serde")]
    pub secondary_copy_timeout: Duration,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TRANSFER_TIMEOUT,
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
            secondary_copy_timeout: DEFAULT_SECONDARY_COPY_TIMEOUT,
            command_timeout: default_command_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CleanupConfig {
    /// Delete old images from areas that are short on space.
    #[serde(default)]
    pub reclaim_if_full: bool,

    /// Delete old images from every area before checking space.
    #[serde(default)]
    pub clean_old_images: bool,
}

fn default_catalog() -> String {
    DEFAULT_CATALOG.to_string()
}

fn default_registry() -> PathBuf {
    PathBuf::from(DEFAULT_REGISTRY)
}

fn default_repository_list() -> String {
    DEFAULT_REPOSITORY_LIST.to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_transfer_timeout() -> Duration {
    DEFAULT_TRANSFER_TIMEOUT
}

fn default_verify_timeout() -> Duration {
    DEFAULT_VERIFY_TIMEOUT
}

fn default_secondary_copy_timeout() -> Duration {
    DEFAULT_SECONDARY_COPY_TIMEOUT
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        if config.registry.is_relative()
            && let Some(dir) = path.parent()
        {
            config.registry = dir.join(&config.registry);
        }
        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Checks that need more than one field.
    fn validate(&self) -> Result<()> {
        if self.repository.override_address.is_none() && self.repository.region.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "repository.region is required unless repository.override is set".to_string(),
            ));
        }
        if self.catalog.trim().is_empty() {
            return Err(Error::InvalidConfig("catalog cannot be empty".to_string()));
        }
        for device in self.devices.iter() {
            let profile = &device.profile;
            if profile.os == OsFamily::IosXe
                && profile.flags.iosxe_install_mode
                && profile.flags.running_build().is_none()
            {
                return Err(Error::InvalidConfig(format!(
                    "{}: flags.iosxe_build is required when flags.iosxe_install_mode is set",
                    device.host
                )));
            }
        }
        Ok(())
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, dry_run: bool, max_retries: Option<u32>) -> Self {
        self.dry_run |= dry_run;
        if let Some(n) = max_retries {
            self.transfer.max_retries = n;
        }
        self
    }

    /// Devices to run against, optionally narrowed to one host.
    pub fn select_devices(&self, host: Option<&str>) -> Result<Vec<&DeviceConfig>> {
        match host {
            None => Ok(self.devices.iter().collect()),
            Some(host) => {
                let found: Vec<_> = self.devices.iter().filter(|d| d.host == host).collect();
                if found.is_empty() {
                    Err(Error::UnknownDevice(host.to_string()))
                } else {
                    Ok(found)
                }
            }
        }
    }

    pub fn repository_source(&self) -> RepositorySource {
        match &self.repository.override_address {
            Some(address) => RepositorySource::Override(address.clone()),
            None => RepositorySource::Region {
                list: self.repository.list.clone(),
                region: self.repository.region.clone(),
            },
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            catalog: self.catalog.clone(),
            repository: self.repository_source(),
            repository_path: self.repository.path.clone(),
            max_retries: self.transfer.max_retries,
            transfer_timeout: self.transfer.timeout,
            verify_timeout: self.transfer.verify_timeout,
            secondary_copy_timeout: self.transfer.secondary_copy_timeout,
            reclaim_if_full: self.cleanup.reclaim_if_full,
            clean_old_images: self.cleanup.clean_old_images,
            dry_run: self.dry_run,
        }
    }
}
