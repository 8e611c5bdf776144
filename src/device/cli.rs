// ABOUTME: Facts source backed by a device profile and live `dir` queries.
// ABOUTME: Identity comes from config; free space and file sizes come from the device.

use super::{DeviceContext, DeviceFacts, FactsError, FactsSource, ModeFlags, OsFamily, StorageArea};
use crate::session::CommandSession;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

/// Static identity of a device, as declared in the config.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceProfile {
    pub os: OsFamily,
    pub platform: String,
    pub running_image: String,
    #[serde(default)]
    pub running_image_fs: Option<String>,
    #[serde(default = "default_system_fs")]
    pub system_fs: String,
    /// Storage areas to track. Defaults to the system area only.
    #[serde(default)]
    pub storage: Vec<String>,
    #[serde(default = "default_network_view")]
    pub network_view: String,
    #[serde(default)]
    pub flags: ModeFlags,
}

fn default_system_fs() -> String {
    "flash".to_string()
}

fn default_network_view() -> String {
    "default".to_string()
}

impl DeviceProfile {
    /// Storage areas in device order, with the system area first.
    pub fn storage_areas(&self) -> Vec<String> {
        let mut areas = vec![self.system_fs.clone()];
        for area in &self.storage {
            if !areas.contains(area) {
                areas.push(area.clone());
            }
        }
        areas
    }
}

/// Facts source that asks the device for everything that can change.
pub struct CliFacts<'a, S: CommandSession> {
    session: &'a S,
    hostname: String,
    profile: DeviceProfile,
}

impl<'a, S: CommandSession> CliFacts<'a, S> {
    pub fn new(session: &'a S, hostname: impl Into<String>, profile: DeviceProfile) -> Self {
        Self {
            session,
            hostname: hostname.into(),
            profile,
        }
    }

    async fn free_bytes(&self, area: &str) -> Result<u64, FactsError> {
        let output = self.session.send(&format!("dir {area}:")).await?;
        parse_free_bytes(&output).ok_or_else(|| FactsError::Parse {
            what: format!("free space of {area}"),
        })
    }
}

#[async_trait]
impl<S: CommandSession> FactsSource for CliFacts<'_, S> {
    fn context(&self) -> DeviceContext {
        DeviceContext {
            hostname: self.hostname.clone(),
            os: self.profile.os,
            flags: self.profile.flags.clone(),
        }
    }

    async fn refresh(&self) -> Result<DeviceFacts, FactsError> {
        let mut storage = Vec::new();
        for area in self.profile.storage_areas() {
            let free = self.free_bytes(&area).await?;
            tracing::debug!(area = %area, free, "storage area refreshed");
            storage.push(StorageArea::new(area, free));
        }

        Ok(DeviceFacts {
            hostname: self.hostname.clone(),
            os: self.profile.os,
            platform: self.profile.platform.clone(),
            running_image: self.profile.running_image.clone(),
            running_image_fs: self
                .profile
                .running_image_fs
                .clone()
                .unwrap_or_else(|| self.profile.system_fs.clone()),
            system_fs: self.profile.system_fs.clone(),
            storage,
            network_view: self.profile.network_view.clone(),
            flags: self.profile.flags.clone(),
        })
    }

    async fn file_size(&self, area: &str, filename: &str) -> Result<Option<u64>, FactsError> {
        let output = self.session.send(&format!("dir {area}:/{filename}")).await?;
        Ok(parse_file_size(&output, filename))
    }
}

fn free_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s+bytes\s+free").expect("static regex"))
}

fn entry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Optional "<index> <perms>" columns (IOS/ASA), then the size column.
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:\d+\s+[-dlrwx]{2,}\s+)?(\d+)\s+.*\s(\S+)\s*$").expect("static regex")
    })
}

/// Parse the `N bytes free` trailer of a directory listing.
pub(crate) fn parse_free_bytes(output: &str) -> Option<u64> {
    free_re()
        .captures_iter(output)
        .last()
        .and_then(|c| c[1].parse().ok())
}

/// Find the size column of the listing line whose name is `filename`.
pub(crate) fn parse_file_size(output: &str, filename: &str) -> Option<u64> {
    output.lines().find_map(|line| {
        let caps = entry_re().captures(line)?;
        let name = caps[2].rsplit(['/', ':']).next().unwrap_or(&caps[2]);
        if name == filename {
            caps[1].parse().ok()
        } else {
            None
        }
    })
}
