// ABOUTME: Run orchestrator: the end-to-end transfer sequence for one device.
// ABOUTME: Re-reads device facts after every step that can change storage.

mod error;

pub use error::{RunError, RunErrorKind};

use crate::capacity;
use crate::catalog::{self, ImageRecord, ImageRole};
use crate::device::{DeviceContext, DeviceFacts, FactsSource, OsFamily};
use crate::diagnostics::{Diagnostics, Warning};
use crate::dialect::dialect_for;
use crate::janitor::Janitor;
use crate::registry::ListRegistry;
use crate::repository::{self, RepositorySource};
use crate::session::CommandSession;
use crate::transfer::{ImageSource, RetryController, TransferSettings};
use crate::verify::Verifier;
use error::{
    CatalogListSnafu, CatalogSnafu, CleanupSnafu, FactsSnafu, RepositoryListSnafu, RepositorySnafu,
    SecondaryCopySnafu, TransferSnafu, VerifySnafu,
};
use snafu::ResultExt;
use std::time::Duration;

/// Default ceiling for copying an image between local storage areas.
pub const DEFAULT_SECONDARY_COPY_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Operator choices for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Name of the image catalog list.
    pub catalog: String,
    pub repository: RepositorySource,
    /// Normalized repository directory path.
    pub repository_path: String,
    pub max_retries: u32,
    pub transfer_timeout: Duration,
    pub verify_timeout: Duration,
    pub secondary_copy_timeout: Duration,
    /// Run the janitor on failing areas when space is short.
    pub reclaim_if_full: bool,
    /// Run the janitor on every area before the capacity check.
    pub clean_old_images: bool,
    pub dry_run: bool,
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The device already runs the target image.
    AlreadyRunning,
    /// Every target image is already on the device and verified.
    AlreadyPresent,
    /// At least one image was transferred. `None` means that image was already valid.
    Transferred {
        primary_attempts: Option<u32>,
        kickstart_attempts: Option<u32>,
    },
}

/// A target image and whether a verified copy already sits on the device.
struct Target {
    image: ImageRecord,
    valid: bool,
}

/// Runs the transfer sequence against one device.
pub struct Orchestrator<'a, S, F, R> {
    session: &'a S,
    facts: &'a F,
    registry: &'a R,
    options: &'a RunOptions,
}

impl<'a, S, F, R> Orchestrator<'a, S, F, R>
where
    S: CommandSession,
    F: FactsSource,
    R: ListRegistry,
{
    pub fn new(session: &'a S, facts: &'a F, registry: &'a R, options: &'a RunOptions) -> Self {
        Self {
            session,
            facts,
            registry,
            options,
        }
    }

    /// Execute the full sequence.
    pub async fn run(&self, diagnostics: &mut Diagnostics) -> Result<RunOutcome, RunError> {
        let context = self.facts.context();
        tracing::info!("Begin {} software transfer", context.os);
        check_context(&context)?;
        let mut device = self.refresh().await?;

        tracing::info!("Interacting with: {}", device.hostname);
        tracing::info!("Detected platform prefix is: {}", device.platform);
        tracing::info!(
            "Current system image is: {}:/{}",
            device.running_image_fs,
            device.running_image
        );
        if device.os == OsFamily::IosXe {
            let mode = if device.flags.iosxe_install_mode { "INSTALL" } else { "BUNDLE" };
            tracing::info!("This device is in {mode} mode.");
        }
        if device.running_image_fs != device.system_fs {
            diagnostics.warn(Warning::running_image_location(
                &device.hostname,
                format!(
                    "the current running image is on {}:, not the default file system {}:",
                    device.running_image_fs, device.system_fs
                ),
            ));
        }

        let (primary, kickstart) = self.select_images(&device).await?;

        if already_running(&device, &primary) {
            tracing::info!("{} is already running the target upgrade image.", device.hostname);
            return Ok(RunOutcome::AlreadyRunning);
        }

        let primary = self.inspect_existing(&device, primary).await?;
        let kickstart = match kickstart {
            Some(image) => Some(self.inspect_existing(&device, image).await?),
            None => None,
        };
        if primary.valid && kickstart.as_ref().is_none_or(|k| k.valid) {
            tracing::info!("Target image(s) already present and verified; nothing to do.");
            return Ok(RunOutcome::AlreadyPresent);
        }

        let keep: Vec<String> = std::iter::once(&primary)
            .chain(kickstart.as_ref())
            .map(|t| t.image.filename.clone())
            .collect();

        let janitor = Janitor::new(self.session, self.options.dry_run);
        if self.options.clean_old_images {
            tracing::info!("Forcefully removing old images ...");
            janitor
                .remove_old_images(&device, &device.storage_names(), &keep)
                .await
                .context(CleanupSnafu)?;
            device = self.refresh().await?;
        }

        let required = primary.image.size + kickstart.as_ref().map_or(0, |k| k.image.size);
        device = self.ensure_capacity(device, required, &janitor, &keep, diagnostics).await?;

        let source = ImageSource::new(self.repository_address(&device).await?, &self.options.repository_path);

        let controller = RetryController::new(
            self.session,
            self.facts,
            TransferSettings {
                timeout: self.options.transfer_timeout,
                verify_timeout: self.options.verify_timeout,
                max_retries: self.options.max_retries,
                dry_run: self.options.dry_run,
            },
        );

        let mut primary_attempts = None;
        if !primary.valid {
            tracing::info!("Starting transfer of upgrade image ...");
            let report = controller
                .run(&device, &source, &primary.image)
                .await
                .context(TransferSnafu)?;
            primary_attempts = Some(report.attempts);
        }

        let mut kickstart_attempts = None;
        if let Some(ks) = kickstart.as_ref().filter(|k| !k.valid) {
            tracing::info!("Starting transfer of kickstart upgrade image ...");
            let report = controller.run(&device, &source, &ks.image).await.context(TransferSnafu)?;
            kickstart_attempts = Some(report.attempts);
        }

        device = self.refresh().await?;
        self.propagate(&device, &primary.image).await?;

        Ok(RunOutcome::Transferred {
            primary_attempts,
            kickstart_attempts,
        })
    }

    async fn refresh(&self) -> Result<DeviceFacts, RunError> {
        self.facts.refresh().await.context(FactsSnafu).inspect_err(|e| {
            tracing::error!("{e}");
        })
    }

    async fn select_images(&self, device: &DeviceFacts) -> Result<(ImageRecord, Option<ImageRecord>), RunError> {
        let list = &self.options.catalog;
        tracing::info!("Searching for target upgrade image from list \"{list}\" ...");
        let rows = self
            .registry
            .rows_by_name(list)
            .await
            .context(CatalogListSnafu { list: list.clone() })?;

        let form_factor = device.form_factor();
        let primary = catalog::lookup(&rows, &device.platform, device.os, ImageRole::Primary, form_factor)
            .context(CatalogSnafu)?;
        tracing::info!("Upgrade image selected: {}, size: {} bytes.", primary.filename, primary.size);

        let kickstart = if device.has_kickstart() {
            let ks = catalog::lookup(&rows, &device.platform, device.os, ImageRole::Kickstart, form_factor)
                .context(CatalogSnafu)?;
            tracing::info!("Kickstart upgrade image selected: {}, size: {} bytes.", ks.filename, ks.size);
            Some(ks)
        } else {
            None
        };
        Ok((primary, kickstart))
    }

    async fn inspect_existing(&self, device: &DeviceFacts, image: ImageRecord) -> Result<Target, RunError> {
        let present = self
            .facts
            .file_size(&device.system_fs, &image.filename)
            .await
            .context(FactsSnafu)?
            .is_some();
        if !present {
            return Ok(Target { image, valid: false });
        }

        tracing::info!("{} already exists on this device. Verifying integrity ...", image.filename);
        let valid = Verifier::new(self.session, self.options.verify_timeout, self.options.dry_run)
            .verify(device, &image)
            .await
            .context(VerifySnafu {
                filename: image.filename.clone(),
            })?;
        if valid {
            tracing::info!("Integrity check passed.");
        } else {
            tracing::warn!("Integrity check failed. Continuing with transfer.");
        }
        Ok(Target { image, valid })
    }

    async fn ensure_capacity(
        &self,
        device: DeviceFacts,
        required: u64,
        janitor: &Janitor<'_, S>,
        keep: &[String],
        diagnostics: &mut Diagnostics,
    ) -> Result<DeviceFacts, RunError> {
        tracing::info!(
            "Checking if {} file system(s) has sufficient space for target upgrade image ...",
            device.storage.len()
        );
        let mut check = capacity::validate(required, &device.storage);
        if check.passed() {
            tracing::info!("Free space validation PASSED for {} file system(s)", device.storage.len());
            return Ok(device);
        }
        tracing::warn!("Free space validation FAILED for {} file system(s)", check.failing.len());

        let mut device = device;
        if self.options.reclaim_if_full && !self.options.clean_old_images {
            tracing::info!("Attempting to reclaim storage space ...");
            janitor
                .remove_old_images(&device, &check.failing, keep)
                .await
                .context(CleanupSnafu)?;
            device = self.refresh().await?;
            tracing::info!("Re-checking {} file system(s) for free space ...", device.storage.len());
            check = capacity::validate(required, &device.storage);
        }

        if check.passed() {
            return Ok(device);
        }
        tracing::error!("Insufficient space available for target upgrade image.");
        if self.options.dry_run {
            diagnostics.warn(Warning::insufficient_space(
                &device.hostname,
                format!("insufficient free space on {} (dry-run, continuing)", check.failing.join(", ")),
            ));
            return Ok(device);
        }
        Err(RunError::InsufficientSpace { areas: check.failing })
    }

    async fn repository_address(&self, device: &DeviceFacts) -> Result<String, RunError> {
        match &self.options.repository {
            RepositorySource::Override(address) => {
                tracing::info!("Repo host override. Using: {address}");
                Ok(address.clone())
            }
            RepositorySource::Region { list, region } => {
                tracing::info!(
                    "Selecting repo for network view \"{}\", region: {region} ...",
                    device.network_view
                );
                let rows = self
                    .registry
                    .rows_by_name(list)
                    .await
                    .context(RepositoryListSnafu { list: list.clone() })?;
                repository::resolve(&rows, region, &device.network_view).context(RepositorySnafu)
            }
        }
    }

    /// Copy the primary image from the default area to every other area.
    async fn propagate(&self, device: &DeviceFacts, image: &ImageRecord) -> Result<(), RunError> {
        if !matches!(device.os, OsFamily::Ios | OsFamily::IosXe) || device.storage.len() < 2 {
            return Ok(());
        }
        let dialect = dialect_for(device.os);
        for area in device.storage.iter().filter(|a| a.name != device.system_fs) {
            let Some(cmd) = dialect.secondary_copy_command(&device.system_fs, &area.name, &image.filename) else {
                continue;
            };
            tracing::info!("Copying {} to '{}' ...", image.filename, area.name);
            if self.options.dry_run {
                tracing::info!("dry-run cmd: {}", cmd.trim_end());
                continue;
            }
            let output = self
                .session
                .send_long(&cmd, self.options.secondary_copy_timeout, "")
                .await
                .context(SecondaryCopySnafu { area: area.name.clone() })
                .inspect_err(|e| tracing::error!("{e}"))?;
            tracing::debug!(output = %output, "secondary copy returned");
        }
        Ok(())
    }
}

/// Reject device contexts that cannot safely manage images.
fn check_context(context: &DeviceContext) -> Result<(), RunError> {
    let flags = &context.flags;
    let reason = match context.os {
        OsFamily::Asa if flags.asa_multi_context && !flags.asa_admin_context => {
            Some("non-admin ASA context; run against the admin context instead")
        }
        OsFamily::NxOs if flags.nxos_vdc && !flags.nxos_default_vdc => {
            Some("non-default NX-OS VDC; run against the default VDC instead")
        }
        OsFamily::NxOs if flags.nxos_aci => Some("NX-OS in ACI mode is not supported"),
        OsFamily::IosXe if flags.iosxe_sdwan => Some("IOS-XE SD-WAN is not supported"),
        _ => None,
    };
    match reason {
        Some(reason) => {
            tracing::error!("{}: {reason}", context.hostname);
            Err(RunError::Unsupported {
                reason: reason.to_string(),
            })
        }
        None => Ok(()),
    }
}

/// True if the device already runs `image`.
fn already_running(device: &DeviceFacts, image: &ImageRecord) -> bool {
    if device.install_mode()
        && let Some(build) = device.running_build()
        && image.filename.contains(&format!(".{build}."))
    {
        return true;
    }
    // `show version` truncates long names on some platforms, hence the prefix test.
    !device.running_image.is_empty() && image.filename.starts_with(&device.running_image)
}
