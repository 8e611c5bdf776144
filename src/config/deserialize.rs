// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles the device list, the repository override and directory path normalization.

use nonempty::NonEmpty;
use serde::Deserialize;

use super::DeviceConfig;

/// Placeholder left in an unedited override field.
pub const OVERRIDE_PLACEHOLDER: &str = "IP Address";
/// Placeholder left in an unedited directory path field.
pub const PATH_PLACEHOLDER: &str = "Directory path";

pub fn deserialize_devices<'de, D>(deserializer: D) -> Result<NonEmpty<DeviceConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let devices: Vec<DeviceConfig> = Vec::deserialize(deserializer)?;
    NonEmpty::from_vec(devices).ok_or_else(|| serde::de::Error::custom("at least one device is required"))
}

pub fn deserialize_override<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(v) => validate_override(&v).map(Some).map_err(serde::de::Error::custom),
    }
}

pub fn deserialize_repo_path<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(normalize_repo_path(value.as_deref().unwrap_or("")))
}

/// Reject blank or placeholder override addresses.
pub fn validate_override(value: &str) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("repository override address cannot be empty".to_string());
    }
    if value == OVERRIDE_PLACEHOLDER {
        return Err(format!(
            "repository override is still the placeholder \"{OVERRIDE_PLACEHOLDER}\""
        ));
    }
    Ok(value.to_string())
}

/// One leading slash, no trailing slash, empty when unset.
pub fn normalize_repo_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == PATH_PLACEHOLDER {
        return String::new();
    }
    let inner = trimmed.trim_matches('/');
    if inner.is_empty() {
        String::new()
    } else {
        format!("/{inner}")
    }
}
