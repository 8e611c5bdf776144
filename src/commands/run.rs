// ABOUTME: Run command implementation.
// ABOUTME: Connects to each device in turn and drives the transfer orchestrator.

use imgxfer::config::{Config, DeviceConfig};
use imgxfer::device::CliFacts;
use imgxfer::diagnostics::{Diagnostics, Warning};
use imgxfer::error::{Error, Result};
use imgxfer::output::Output;
use imgxfer::registry::FileRegistry;
use imgxfer::run::{Orchestrator, RunOptions, RunOutcome};
use imgxfer::ssh::Session;

/// Run the transfer against every selected device, stopping at the first failure.
pub async fn run(config: &Config, device: Option<&str>, output: &Output) -> Result<()> {
    let devices = config.select_devices(device)?;
    let registry = FileRegistry::load(&config.registry)?;
    let options = config.run_options();
    let mut diag = Diagnostics::default();

    if options.dry_run {
        output.progress("Dry run: copy and delete commands will be logged, not sent");
    }

    let mut run_error = None;
    for dev in &devices {
        output.progress(&format!("Transferring to {} ({})", dev.host, dev.profile.os));
        let result = run_device(dev, config, &registry, &options, &mut diag).await;
        if let Ok(outcome) = &result {
            output.device(&dev.host, &describe(outcome));
        }
        for line in host_warnings(&diag, &dev.host) {
            output.warning(&line);
        }
        if let Err(e) = result {
            run_error = Some(e);
            break;
        }
    }

    if let Some(e) = run_error {
        return Err(e);
    }

    output.success(&format!("Transfer complete for {} device(s)", devices.len()));
    Ok(())
}

async fn run_device(
    dev: &DeviceConfig,
    config: &Config,
    registry: &FileRegistry,
    options: &RunOptions,
    diag: &mut Diagnostics,
) -> Result<RunOutcome> {
    let session_config = dev.session_config(config.transfer.command_timeout)?;
    let session = Session::connect(session_config).await.map_err(|source| Error::Ssh {
        host: dev.host.clone(),
        source,
    })?;

    let facts = CliFacts::new(&session, &dev.host, dev.profile.clone());
    let result = Orchestrator::new(&session, &facts, registry, options).run(diag).await;
    drop(facts);

    if let Err(e) = session.disconnect().await {
        diag.warn(Warning::ssh_disconnect(&dev.host, e.to_string()));
    }

    result.map_err(|source| Error::Run {
        host: dev.host.clone(),
        source,
    })
}

/// Warnings one device raised, ready to print under that device.
fn host_warnings(diag: &Diagnostics, host: &str) -> Vec<String> {
    diag.for_host(host).map(ToString::to_string).collect()
}

fn describe(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::AlreadyRunning => "already running the target image".to_string(),
        RunOutcome::AlreadyPresent => "target image already present and verified".to_string(),
        RunOutcome::Transferred {
            primary_attempts,
            kickstart_attempts,
        } => {
            let mut parts = Vec::new();
            if let Some(n) = primary_attempts {
                parts.push(format!("image transferred in {n} attempt(s)"));
            }
            if let Some(n) = kickstart_attempts {
                parts.push(format!("kickstart transferred in {n} attempt(s)"));
            }
            if parts.is_empty() {
                "target image(s) already valid".to_string()
            } else {
                parts.join(", ")
            }
        }
    }
}
