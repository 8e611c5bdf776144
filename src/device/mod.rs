// ABOUTME: Device facts model and the facts collaborator capability.
// ABOUTME: Facts are read-only snapshots; callers re-fetch after storage changes.

mod cli;

pub use cli::{CliFacts, DeviceProfile};

use crate::session::SessionError;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

/// Operating-system family of a managed device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum OsFamily {
    #[serde(rename = "ios", alias = "IOS")]
    Ios,
    #[serde(rename = "ios-xe", alias = "IOS-XE")]
    IosXe,
    #[serde(rename = "nx-os", alias = "NX-OS")]
    NxOs,
    #[serde(rename = "asa", alias = "ASA")]
    Asa,
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OsFamily::Ios => "IOS",
            OsFamily::IosXe => "IOS-XE",
            OsFamily::NxOs => "NX-OS",
            OsFamily::Asa => "ASA",
        };
        f.write_str(name)
    }
}

/// A named, independently sized storage region on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageArea {
    /// Key the facts source uses for this area.
    pub key: String,
    /// Name used in CLI paths (`flash`, `bootflash`, `disk0`).
    pub name: String,
    pub free_bytes: u64,
}

impl StorageArea {
    pub fn new(name: impl Into<String>, free_bytes: u64) -> Self {
        let name = name.into();
        Self {
            key: name.clone(),
            name,
            free_bytes,
        }
    }
}

/// OS-specific mode flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModeFlags {
    /// IOS-XE booted in install mode (packages instead of a monolithic image).
    pub iosxe_install_mode: bool,
    /// IOS-XE running build token, e.g. `16.12.03a`.
    pub iosxe_build: Option<String>,
    pub iosxe_sdwan: bool,
    /// NX-OS running kickstart image, when the platform uses one.
    pub nxos_kickstart_image: Option<String>,
    pub nxos_vdc: bool,
    pub nxos_default_vdc: bool,
    pub nxos_aci: bool,
    pub asa_multi_context: bool,
    pub asa_admin_context: bool,
    /// 5506-X / 5508-X / 5516-X class appliance.
    pub asa_lfbff: bool,
    /// 5512-X through 5585-X and ASAv.
    pub asa_smp: bool,
}

/// ASA hardware class used to pick between image variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormFactor {
    Lfbff,
    Smp,
    Legacy,
}

/// Identity known before any command is sent: enough to refuse
/// unsupported contexts without touching the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceContext {
    pub hostname: String,
    pub os: OsFamily,
    pub flags: ModeFlags,
}

/// Snapshot of everything the core needs to know about a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFacts {
    pub hostname: String,
    pub os: OsFamily,
    /// Image filename prefix for this hardware, e.g. `c3560cx`.
    pub platform: String,
    pub running_image: String,
    /// Storage area holding the running image.
    pub running_image_fs: String,
    /// Default storage area; transfers always land here.
    pub system_fs: String,
    /// Storage areas in device order, default area first.
    pub storage: Vec<StorageArea>,
    /// Network view used for repository selection.
    pub network_view: String,
    pub flags: ModeFlags,
}

impl ModeFlags {
    pub fn running_build(&self) -> Option<&str> {
        self.iosxe_build.as_deref().map(str::trim).filter(|b| !b.is_empty())
    }

    pub fn form_factor(&self) -> FormFactor {
        if self.asa_lfbff {
            FormFactor::Lfbff
        } else if self.asa_smp {
            FormFactor::Smp
        } else {
            FormFactor::Legacy
        }
    }
}

impl DeviceFacts {
    pub fn form_factor(&self) -> FormFactor {
        self.flags.form_factor()
    }

    /// Whether this device carries a separate kickstart image.
    pub fn has_kickstart(&self) -> bool {
        self.os == OsFamily::NxOs && self.flags.nxos_kickstart_image.is_some()
    }

    pub fn install_mode(&self) -> bool {
        self.os == OsFamily::IosXe && self.flags.iosxe_install_mode
    }

    /// Running IOS-XE build token, if one is known and non-blank.
    pub fn running_build(&self) -> Option<&str> {
        self.flags.running_build()
    }

    pub fn context(&self) -> DeviceContext {
        DeviceContext {
            hostname: self.hostname.clone(),
            os: self.os,
            flags: self.flags.clone(),
        }
    }

    pub fn storage_names(&self) -> Vec<String> {
        self.storage.iter().map(|a| a.name.clone()).collect()
    }
}

/// Errors from the facts collaborator.
#[derive(Debug, thiserror::Error)]
pub enum FactsError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("unable to parse {what} from device output")]
    Parse { what: String },
}

/// Source of device facts. Implementations re-query the device on every call.
#[async_trait]
pub trait FactsSource: Send + Sync {
    /// Static identity. Never talks to the device.
    fn context(&self) -> DeviceContext;

    /// Re-query the device and return a fresh snapshot.
    async fn refresh(&self) -> Result<DeviceFacts, FactsError>;

    /// Size in bytes of `filename` on `area`, or `None` if it does not exist.
    async fn file_size(&self, area: &str, filename: &str) -> Result<Option<u64>, FactsError>;
}
