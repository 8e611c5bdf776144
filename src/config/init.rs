// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates an imgxfer.yml template file.

use std::path::Path;

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

pub fn init_config(dir: &Path, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    std::fs::write(&config_path, TEMPLATE)?;
    Ok(())
}

const TEMPLATE: &str = r#"# Image catalog list name in the registry file.
catalog: Cisco OS SW Hashes
registry: registry.yml

repository:
  region: Region
  # list: Cisco OS SW Regional Repos
  # Fixed repository address; skips regional selection.
  # override: 10.0.0.5
  path: /pub/cisco

transfer:
  max_retries: 3
  timeout: 40m
  verify_timeout: 30m
  secondary_copy_timeout: 1h
  command_timeout: 60s

cleanup:
  reclaim_if_full: false
  clean_old_images: false

dry_run: true
debug: false

devices:
  - host: switch1.example.net
    user: netops
    password:
      env: IMGXFER_PASSWORD
    # SSH host key verification (default: false)
    # Set to true to enable Trust-On-First-Use, or pre-populate ~/.ssh/known_hosts
    # trust_first_connection: true
    os: ios
    platform: c3560cx
    running_image: c3560cx-universalk9-mz.152-7.E6.bin
    system_fs: flash
"#;
