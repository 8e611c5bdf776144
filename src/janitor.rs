// ABOUTME: Image janitor: removes obsolete images and packages from storage areas.
// ABOUTME: Never touches the running image, the running build, or anything in the keep list.

use crate::device::{DeviceFacts, OsFamily};
use crate::dialect::{Dialect, dialect_for};
use crate::session::{CommandSession, SessionError};
use regex::Regex;

#[derive(Debug, thiserror::Error)]
pub enum JanitorError {
    #[error("NX-OS in ACI mode is not supported")]
    AciMode,

    #[error("IOS-XE install mode without a known running build; refusing to delete packages")]
    UnknownRunningBuild,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// A file chosen for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obsolete {
    pub area: String,
    pub filename: String,
    /// Log label: "old image", "old kickstart image" or "inactive package".
    pub kind: &'static str,
}

impl Obsolete {
    pub fn path(&self) -> String {
        format!("{}:/{}", self.area, self.filename)
    }
}

/// Deletes obsolete images through a command session.
pub struct Janitor<'a, S> {
    session: &'a S,
    dry_run: bool,
}

impl<'a, S: CommandSession> Janitor<'a, S> {
    pub fn new(session: &'a S, dry_run: bool) -> Self {
        Self { session, dry_run }
    }

    /// Remove obsolete images from `areas`, sparing any filename in `keep`.
    ///
    /// Returns what was deleted (or, in dry-run, what would have been).
    /// NX-OS always works on the default storage area.
    pub async fn remove_old_images(
        &self,
        device: &DeviceFacts,
        areas: &[String],
        keep: &[String],
    ) -> Result<Vec<Obsolete>, JanitorError> {
        let dialect = dialect_for(device.os);
        let mut removed = Vec::new();

        if device.install_mode() {
            if device.running_build().is_none() {
                let err = JanitorError::UnknownRunningBuild;
                tracing::error!("{err}");
                return Err(err);
            }
            for area in areas {
                let found = self.enumerate_packages(dialect, device, area, keep).await?;
                self.delete_all(dialect, area, &found, "old images/inactive packages").await?;
                removed.extend(found);
            }
            return Ok(removed);
        }

        if device.os == OsFamily::NxOs {
            if device.flags.nxos_aci {
                return Err(JanitorError::AciMode);
            }
            let found = self.enumerate_nxos(dialect, device, keep).await?;
            self.delete_all(dialect, &device.system_fs, &found, "old images").await?;
            return Ok(found);
        }

        for area in areas {
            tracing::info!("  Enumerating old images from {area}:");
            let cmd = dialect.list_images_command(area, &device.platform);
            let output = self.session.send(&cmd).await?;
            let found = select(
                &output,
                |line| dialect.parse_listing_line(line, &device.platform),
                |file| !file.starts_with(&device.running_image),
                keep,
                area,
                "old image",
            );
            self.delete_all(dialect, area, &found, "old images").await?;
            removed.extend(found);
        }
        Ok(removed)
    }

    async fn enumerate_packages(
        &self,
        dialect: &dyn Dialect,
        device: &DeviceFacts,
        area: &str,
        keep: &[String],
    ) -> Result<Vec<Obsolete>, JanitorError> {
        tracing::info!("  Enumerating old images/inactive packages from {area}:");
        let Some(cmd) = dialect.list_packages_command(area, &device.platform) else {
            return Ok(Vec::new());
        };
        let output = self.session.send(&cmd).await?;
        let Some(pattern) = package_pattern(&device.platform) else {
            return Ok(Vec::new());
        };
        let running_build = device.running_build();

        let mut found = Vec::new();
        for line in output.lines() {
            let Some(caps) = pattern.captures(line) else {
                continue;
            };
            let (file, build) = (&caps[1], &caps[2]);
            if Some(build) == running_build || keep.iter().any(|k| k == file) {
                continue;
            }
            let kind = package_kind(file);
            tracing::info!("    Found {kind}: {area}:/{file}");
            found.push(Obsolete {
                area: area.to_string(),
                filename: file.to_string(),
                kind,
            });
        }
        Ok(found)
    }

    async fn enumerate_nxos(
        &self,
        dialect: &dyn Dialect,
        device: &DeviceFacts,
        keep: &[String],
    ) -> Result<Vec<Obsolete>, JanitorError> {
        let area = device.system_fs.as_str();
        let parse = |line: &str| dialect.parse_listing_line(line, &device.platform);
        let mut found = Vec::new();

        if let Some(active) = device.flags.nxos_kickstart_image.as_deref()
            && let Some(cmd) = dialect.list_kickstart_command(area, &device.platform)
        {
            tracing::info!("  Enumerating old kickstart images from {area}:");
            let output = self.session.send(&cmd).await?;
            found.extend(select(
                &output,
                parse,
                |file| !file.starts_with(active),
                keep,
                area,
                "old kickstart image",
            ));
        }

        tracing::info!("  Enumerating old images from {area}:");
        let cmd = dialect.list_images_command(area, &device.platform);
        let output = self.session.send(&cmd).await?;
        found.extend(select(
            &output,
            parse,
            |file| !file.starts_with(&device.running_image),
            keep,
            area,
            "old image",
        ));
        Ok(found)
    }

    async fn delete_all(
        &self,
        dialect: &dyn Dialect,
        area: &str,
        found: &[Obsolete],
        what: &str,
    ) -> Result<(), JanitorError> {
        if found.is_empty() {
            tracing::info!("    No {what} found in {area}:");
            return Ok(());
        }

        tracing::info!("      Deleting {} {what} from {area}:", found.len());
        let total = found.len();
        for (i, item) in found.iter().enumerate() {
            tracing::info!("        ({}/{total}) Deleting {}", i + 1, item.path());
            let cmd = dialect.delete_image_command(&item.area, &item.filename);
            if self.dry_run {
                tracing::info!("dry-run cmd: {cmd}");
            } else {
                self.session.send(&cmd).await?;
            }
        }
        Ok(())
    }
}

fn select(
    output: &str,
    parse: impl Fn(&str) -> Option<String>,
    is_obsolete: impl Fn(&str) -> bool,
    keep: &[String],
    area: &str,
    kind: &'static str,
) -> Vec<Obsolete> {
    let mut found: Vec<Obsolete> = Vec::new();
    for file in output.lines().filter_map(&parse) {
        if !is_obsolete(&file) || keep.contains(&file) || found.iter().any(|o| o.filename == file) {
            continue;
        }
        tracing::info!("    Found {kind}: {area}:/{file}");
        found.push(Obsolete {
            area: area.to_string(),
            filename: file,
            kind,
        });
    }
    found
}

/// Matches `<platform>...<major>.<minor>.<patch>[letter].<rest>`; group 2 is the build.
fn package_pattern(platform: &str) -> Option<Regex> {
    Regex::new(&format!(
        r"\s({}\S*\.(\d+\.\d+\.\d+[a-zA-Z]?)\.\S*)",
        regex::escape(platform)
    ))
    .ok()
}

fn package_kind(file: &str) -> &'static str {
    match file.rsplit_once('.').map(|(_, ext)| ext) {
        Some("pkg") => "inactive package",
        Some("bin") => "old image",
        _ => "unknown",
    }
}
