// ABOUTME: Image catalog lookup: selects the target image record for a platform.
// ABOUTME: Enforces delimiter-aware prefix matching and ASA form-factor preference.

use crate::device::{FormFactor, OsFamily};
use crate::registry::Row;
use std::collections::BTreeMap;
use std::fmt;

const FILENAME_COLUMN: &str = "Filename";
const SIZE_COLUMN: &str = "Size";
const KICKSTART_MARKER: &str = "kickstart";

/// Which image a lookup is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Primary,
    Kickstart,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::Primary => f.write_str("primary"),
            ImageRole::Kickstart => f.write_str("kickstart"),
        }
    }
}

/// A target image: filename, byte size and content hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub filename: String,
    pub size: u64,
    /// Hashes keyed by lowercased algorithm name (`md5`, `sha512`).
    pub hashes: BTreeMap<String, String>,
}

impl ImageRecord {
    pub fn new(filename: impl Into<String>, size: u64) -> Self {
        Self {
            filename: filename.into(),
            size,
            hashes: BTreeMap::new(),
        }
    }

    pub fn with_hash(mut self, algorithm: &str, value: impl Into<String>) -> Self {
        self.hashes.insert(algorithm.to_ascii_lowercase(), value.into());
        self
    }

    pub fn hash(&self, algorithm: &str) -> Option<&str> {
        self.hashes
            .get(&algorithm.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|h| !h.is_empty())
    }

    pub fn is_kickstart(&self) -> bool {
        self.filename.contains(KICKSTART_MARKER)
    }

    fn from_row(row: &Row) -> Result<Self, CatalogError> {
        let filename = row.get(FILENAME_COLUMN).cloned().unwrap_or_default();
        let raw_size = row.get(SIZE_COLUMN).map(String::as_str).unwrap_or("");
        let size = parse_size(raw_size).ok_or_else(|| CatalogError::InvalidSize {
            filename: filename.clone(),
            value: raw_size.to_string(),
        })?;
        let hashes = row
            .iter()
            .filter(|(column, value)| {
                column.as_str() != FILENAME_COLUMN
                    && column.as_str() != SIZE_COLUMN
                    && !value.trim().is_empty()
            })
            .map(|(column, value)| (column.to_ascii_lowercase(), value.trim().to_string()))
            .collect();
        Ok(Self {
            filename,
            size,
            hashes,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unable to find {role} target image for platform \"{platform}\"")]
    NotFound { platform: String, role: ImageRole },

    #[error("invalid size \"{value}\" for catalog entry {filename}")]
    InvalidSize { filename: String, value: String },
}

/// Parse a comma-grouped decimal byte count such as `15,728,640`.
pub fn parse_size(raw: &str) -> Option<u64> {
    raw.trim().replace(',', "").parse().ok()
}

/// Whether a catalog filename belongs to `platform`.
///
/// Non-ASA filenames must continue with `-`, `_` or `.` after the platform
/// token so that `c800` never matches `c8000aep-...`. ASA filenames carry no
/// delimiter and are matched by plain prefix.
pub fn matches_platform(filename: &str, platform: &str, os: OsFamily) -> bool {
    if platform.is_empty() {
        return false;
    }
    match os {
        OsFamily::Asa => filename.starts_with(platform),
        _ => filename
            .strip_prefix(platform)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| matches!(c, '-' | '_' | '.')),
    }
}

fn filename_of(row: &Row) -> &str {
    row.get(FILENAME_COLUMN).map(String::as_str).unwrap_or("")
}

/// Select the target image record for a platform and role.
pub fn lookup(
    rows: &[Row],
    platform: &str,
    os: OsFamily,
    role: ImageRole,
    form_factor: FormFactor,
) -> Result<ImageRecord, CatalogError> {
    let candidates: Vec<&Row> = rows
        .iter()
        .filter(|row| {
            row.get(FILENAME_COLUMN)
                .is_some_and(|f| matches_platform(f, platform, os))
        })
        .collect();

    let chosen = match os {
        OsFamily::Asa => {
            let marker = match form_factor {
                FormFactor::Lfbff => Some("lfbff"),
                FormFactor::Smp => Some("smp"),
                FormFactor::Legacy => None,
            };
            marker
                .and_then(|m| candidates.iter().find(|row| filename_of(row).contains(m)))
                .or_else(|| candidates.first())
        }
        _ => candidates.iter().find(|row| {
            let is_kickstart = filename_of(row).contains(KICKSTART_MARKER);
            match role {
                ImageRole::Kickstart => is_kickstart,
                ImageRole::Primary => !is_kickstart,
            }
        }),
    };

    match chosen {
        Some(row) => ImageRecord::from_row(row),
        None => {
            let err = CatalogError::NotFound {
                platform: platform.to_string(),
                role,
            };
            tracing::error!("{err}");
            Err(err)
        }
    }
}
