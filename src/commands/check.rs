// ABOUTME: Check command implementation.
// ABOUTME: Resolves catalog images and repositories per device without contacting any device.

use imgxfer::catalog::{self, ImageRole};
use imgxfer::config::Config;
use imgxfer::device::OsFamily;
use imgxfer::error::{Error, Result};
use imgxfer::output::Output;
use imgxfer::registry::{FileRegistry, ListRegistry};
use imgxfer::repository::{self, RepositorySource};

pub async fn check(config: &Config, device: Option<&str>, output: &Output) -> Result<()> {
    let devices = config.select_devices(device)?;
    let registry = FileRegistry::load(&config.registry)?;

    let catalog_rows = registry.rows_by_name(&config.catalog).await?;
    output.progress(&format!(
        "Catalog \"{}\": {} row(s)",
        config.catalog,
        catalog_rows.len()
    ));

    let source = config.repository_source();
    let repo_rows = match &source {
        RepositorySource::Override(address) => {
            output.progress(&format!("Repository override: {address}"));
            Vec::new()
        }
        RepositorySource::Region { list, .. } => registry.rows_by_name(list).await?,
    };

    let mut problems = 0usize;
    for dev in devices {
        let profile = &dev.profile;
        let mut roles = vec![ImageRole::Primary];
        if profile.os == OsFamily::NxOs && profile.flags.nxos_kickstart_image.is_some() {
            roles.push(ImageRole::Kickstart);
        }

        for role in roles {
            match catalog::lookup(
                &catalog_rows,
                &profile.platform,
                profile.os,
                role,
                profile.flags.form_factor(),
            ) {
                Ok(image) => output.device(
                    &dev.host,
                    &format!("{role} image {} ({} bytes)", image.filename, image.size),
                ),
                Err(e) => {
                    problems += 1;
                    output.device(&dev.host, &e.to_string());
                }
            }
        }

        if let RepositorySource::Region { region, .. } = &source {
            match repository::resolve(&repo_rows, region, &profile.network_view) {
                Ok(address) => output.device(&dev.host, &format!("repository {address}{}", config.repository.path)),
                Err(e) => {
                    problems += 1;
                    output.device(&dev.host, &e.to_string());
                }
            }
        }
    }

    if problems > 0 {
        return Err(Error::InvalidConfig(format!("{problems} lookup problem(s) found")));
    }
    output.success("Check passed");
    Ok(())
}
