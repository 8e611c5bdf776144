// ABOUTME: Integration tests for the run orchestrator against a scripted device.
// ABOUTME: Covers short-circuits, capacity handling, retries, propagation and preconditions.

mod support;

use async_trait::async_trait;
use imgxfer::catalog::ImageRecord;
use imgxfer::device::{CliFacts, DeviceProfile, OsFamily};
use imgxfer::diagnostics::{Diagnostics, WarningKind};
use imgxfer::registry::FileRegistry;
use imgxfer::repository::RepositorySource;
use imgxfer::run::{Orchestrator, RunError, RunErrorKind, RunOptions, RunOutcome};
use imgxfer::session::{CommandSession, SessionError};
use parking_lot::Mutex;
use std::time::Duration;
use support::mock_device::{CopyOutcome, MockDevice};

const TARGET: &str = "c3560cx-universalk9-mz.152-7.E7.bin";
const TARGET_SIZE: u64 = 15_728_640;
const TARGET_MD5: &str = "8c1d47e2b9a3f6e0d5c4b3a29180f7e6";
const RUNNING: &str = "c3560cx-universalk9-mz.152-7.E6.bin";

const REGISTRY: &str = r#"
- name: Cisco OS SW Hashes
  rows:
    - Filename: c3560cx-universalk9-mz.152-7.E7.bin
      Size: "15,728,640"
      MD5: 8c1d47e2b9a3f6e0d5c4b3a29180f7e6
    - Filename: n3000-uk9.6.0.2.U6.10.bin
      Size: 190000000
      MD5: 11111111111111111111111111111111
    - Filename: n3000-uk9-kickstart.6.0.2.U6.10.bin
      Size: 37000000
      MD5: 22222222222222222222222222222222
    - Filename: asa9-12-4-smp-k8.bin
      Size: 110000000
      MD5: 33333333333333333333333333333333
- name: Cisco OS SW Regional Repos
  rows:
    - Region: EMEA
      Network View: default
      Address: 10.20.0.5
"#;

fn registry() -> FileRegistry {
    FileRegistry::from_yaml(REGISTRY).unwrap()
}

fn options() -> RunOptions {
    RunOptions {
        catalog: "Cisco OS SW Hashes".to_string(),
        repository: RepositorySource::Override("10.0.0.5".to_string()),
        repository_path: "/pub/cisco".to_string(),
        max_retries: 2,
        transfer_timeout: Duration::from_secs(40 * 60),
        verify_timeout: Duration::from_secs(30 * 60),
        secondary_copy_timeout: Duration::from_secs(3600),
        reclaim_if_full: false,
        clean_old_images: false,
        dry_run: false,
    }
}

fn target() -> ImageRecord {
    ImageRecord::new(TARGET, TARGET_SIZE).with_hash("md5", TARGET_MD5)
}

fn c3560cx(free: u64) -> MockDevice {
    MockDevice::new(OsFamily::Ios, "c3560cx", RUNNING)
        .area("flash", free)
        .image(&target())
}

async fn run(device: &MockDevice, options: &RunOptions) -> (Result<RunOutcome, RunError>, Diagnostics) {
    support::init_tracing();
    let registry = registry();
    let mut diag = Diagnostics::default();
    let result = Orchestrator::new(device, device, &registry, options)
        .run(&mut diag)
        .await;
    (result, diag)
}

#[tokio::test]
async fn c3560cx_transfer_succeeds_in_one_attempt() {
    let device = c3560cx(16_000_000);

    let (result, diag) = run(&device, &options()).await;

    assert_eq!(
        result.unwrap(),
        RunOutcome::Transferred {
            primary_attempts: Some(1),
            kickstart_attempts: None,
        }
    );
    assert!(device.has_file("flash", TARGET));
    assert!(!diag.has_warnings());

    let commands = device.commands();
    assert!(commands.contains(&format!(
        "copy http://10.0.0.5/pub/cisco/{TARGET} flash:/{TARGET}\r\r\r"
    )));
    assert!(commands.contains(&format!("verify /md5 flash:/{TARGET} {TARGET_MD5}")));
}

#[tokio::test]
async fn interrupted_twice_then_success_deletes_partials() {
    let broken = format!("Accessing http://10.0.0.5/pub/cisco/{TARGET}...\n%Error reading http://10.0.0.5/pub/cisco/{TARGET} (Broken pipe)");
    let device = c3560cx(16_000_000).copies([
        CopyOutcome::Output(broken.clone()),
        CopyOutcome::Output(broken),
        CopyOutcome::Success,
    ]);

    let (result, _) = run(&device, &options()).await;

    assert_eq!(
        result.unwrap(),
        RunOutcome::Transferred {
            primary_attempts: Some(3),
            kickstart_attempts: None,
        }
    );
    assert_eq!(device.count("copy http://"), 3);
    assert_eq!(device.count(&format!("delete /force flash:/{TARGET}")), 2);
}

#[tokio::test]
async fn host_failure_is_not_retried() {
    let device = c3560cx(16_000_000).copies([CopyOutcome::Output(format!(
        "%Error opening http://10.0.0.5/pub/cisco/{TARGET} (No such file or directory)"
    ))]);
    let options = RunOptions {
        max_retries: 3,
        ..options()
    };

    let (result, _) = run(&device, &options).await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), RunErrorKind::Transfer);
    assert_eq!(err.reason_name(), Some("NOTCONNECT_OR_FILENOTEXIST"));
    assert_eq!(device.count("copy http://"), 1);
    assert_eq!(device.count("delete"), 0);
}

#[tokio::test]
async fn dry_run_with_insufficient_space_only_warns() {
    let device = c3560cx(1_000);
    let options = RunOptions {
        dry_run: true,
        ..options()
    };

    let (result, diag) = run(&device, &options).await;

    assert!(matches!(
        result.unwrap(),
        RunOutcome::Transferred {
            primary_attempts: Some(1),
            ..
        }
    ));
    assert!(device.mutations().is_empty(), "dry-run sent {:?}", device.mutations());
    assert!(
        diag.warnings()
            .iter()
            .any(|w| w.kind == WarningKind::InsufficientSpace)
    );
}

#[tokio::test]
async fn insufficient_space_is_fatal_without_dry_run() {
    let device = c3560cx(1_000);

    let (result, _) = run(&device, &options()).await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), RunErrorKind::Capacity);
    assert!(device.mutations().is_empty());
}

#[tokio::test]
async fn second_run_is_read_only() {
    let device = c3560cx(16_000_000);
    let (first, _) = run(&device, &options()).await;
    assert!(first.is_ok());

    device.clear_log();
    let (second, _) = run(&device, &options()).await;

    assert_eq!(second.unwrap(), RunOutcome::AlreadyPresent);
    assert!(device.mutations().is_empty());
}

#[tokio::test]
async fn truncated_running_name_short_circuits() {
    let device = MockDevice::new(OsFamily::Ios, "c3560cx", "c3560cx-universalk9-mz.152-7.E7").area("flash", 16_000_000);

    let (result, _) = run(&device, &options()).await;

    assert_eq!(result.unwrap(), RunOutcome::AlreadyRunning);
    assert!(device.commands().is_empty());
}

#[tokio::test]
async fn reclaim_removes_old_images_but_keeps_running_image() {
    let device = c3560cx(1_000_000)
        .file("flash", "c3560cx-universalk9-mz.152-6.E5.bin", 15_000_000)
        .file("flash", RUNNING, 100);
    let options = RunOptions {
        reclaim_if_full: true,
        ..options()
    };

    let (result, _) = run(&device, &options).await;

    assert!(result.is_ok());
    assert!(!device.has_file("flash", "c3560cx-universalk9-mz.152-6.E5.bin"));
    assert!(device.has_file("flash", RUNNING));
    assert!(device.has_file("flash", TARGET));
    assert_eq!(
        device.count("delete /force /recursive flash:/c3560cx-universalk9-mz.152-6.E5.bin"),
        1
    );
}

#[tokio::test]
async fn clean_old_images_runs_before_capacity_check() {
    let device = c3560cx(1_000_000).file("flash", "c3560cx-universalk9-mz.152-6.E5.bin", 15_000_000);
    let options = RunOptions {
        clean_old_images: true,
        ..options()
    };

    let (result, _) = run(&device, &options).await;

    assert!(result.is_ok());
    let commands = device.commands();
    let delete = commands.iter().position(|c| c.starts_with("delete /force /recursive"));
    let copy = commands.iter().position(|c| c.starts_with("copy http://"));
    assert!(delete.unwrap() < copy.unwrap());
}

#[tokio::test]
async fn existing_valid_image_short_circuits() {
    let device = c3560cx(16_000_000).file("flash", TARGET, TARGET_SIZE);

    let (result, _) = run(&device, &options()).await;

    assert_eq!(result.unwrap(), RunOutcome::AlreadyPresent);
    assert!(device.mutations().is_empty());
}

#[tokio::test]
async fn existing_corrupt_image_is_replaced() {
    let device = c3560cx(16_000_000)
        .file("flash", TARGET, TARGET_SIZE)
        .verifications([false, true]);

    let (result, _) = run(&device, &options()).await;

    assert_eq!(
        result.unwrap(),
        RunOutcome::Transferred {
            primary_attempts: Some(1),
            kickstart_attempts: None,
        }
    );
    assert_eq!(device.count("copy http://"), 1);
}

#[tokio::test]
async fn primary_image_propagates_to_secondary_areas() {
    let device = c3560cx(16_000_000).area("flash2", 16_000_000);

    let (result, _) = run(&device, &options()).await;

    assert!(result.is_ok());
    assert!(device.has_file("flash2", TARGET));
    assert!(
        device
            .commands()
            .contains(&format!("copy flash:/{TARGET} flash2:/{TARGET}\r\r\r"))
    );
}

#[tokio::test]
async fn nxos_transfers_system_and_kickstart_images() {
    let system = ImageRecord::new("n3000-uk9.6.0.2.U6.10.bin", 190_000_000)
        .with_hash("md5", "11111111111111111111111111111111");
    let kickstart = ImageRecord::new("n3000-uk9-kickstart.6.0.2.U6.10.bin", 37_000_000)
        .with_hash("md5", "22222222222222222222222222222222");
    let device = MockDevice::new(OsFamily::NxOs, "n3000", "n3000-uk9.6.0.2.U6.5.bin")
        .flags(|f| f.nxos_kickstart_image = Some("n3000-uk9-kickstart.6.0.2.U6.5.bin".into()))
        .area("bootflash", 300_000_000)
        .image(&system)
        .image(&kickstart);

    let (result, _) = run(&device, &options()).await;

    assert_eq!(
        result.unwrap(),
        RunOutcome::Transferred {
            primary_attempts: Some(1),
            kickstart_attempts: Some(1),
        }
    );
    assert!(device.commands().contains(&format!(
        "copy http://10.0.0.5/pub/cisco/{0} bootflash:/{0} vrf default",
        kickstart.filename
    )));
    assert!(device.has_file("bootflash", &system.filename));
    assert!(device.has_file("bootflash", &kickstart.filename));
}

fn nxos_images() -> (ImageRecord, ImageRecord) {
    (
        ImageRecord::new("n3000-uk9.6.0.2.U6.10.bin", 190_000_000)
            .with_hash("md5", "11111111111111111111111111111111"),
        ImageRecord::new("n3000-uk9-kickstart.6.0.2.U6.10.bin", 37_000_000)
            .with_hash("md5", "22222222222222222222222222222222"),
    )
}

fn n3000() -> MockDevice {
    let (system, kickstart) = nxos_images();
    MockDevice::new(OsFamily::NxOs, "n3000", "n3000-uk9.6.0.2.U6.5.bin")
        .flags(|f| f.nxos_kickstart_image = Some("n3000-uk9-kickstart.6.0.2.U6.5.bin".into()))
        .area("bootflash", 300_000_000)
        .image(&system)
        .image(&kickstart)
}

#[tokio::test]
async fn nxos_valid_kickstart_transfers_only_the_system_image() {
    let (system, kickstart) = nxos_images();
    let device = n3000().file("bootflash", &kickstart.filename, kickstart.size);

    let (result, _) = run(&device, &options()).await;

    assert_eq!(
        result.unwrap(),
        RunOutcome::Transferred {
            primary_attempts: Some(1),
            kickstart_attempts: None,
        }
    );
    let copies: Vec<_> = device
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("copy http://"))
        .collect();
    assert_eq!(copies.len(), 1);
    assert!(copies[0].contains(&format!("bootflash:/{}", system.filename)));
    assert!(device.has_file("bootflash", &system.filename));
}

#[tokio::test]
async fn nxos_valid_system_image_transfers_only_the_kickstart() {
    let (system, kickstart) = nxos_images();
    let device = n3000().file("bootflash", &system.filename, system.size);

    let (result, _) = run(&device, &options()).await;

    assert_eq!(
        result.unwrap(),
        RunOutcome::Transferred {
            primary_attempts: None,
            kickstart_attempts: Some(1),
        }
    );
    let copies: Vec<_> = device
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("copy http://"))
        .collect();
    assert_eq!(copies.len(), 1);
    assert!(copies[0].contains(&format!("bootflash:/{}", kickstart.filename)));
    assert!(device.has_file("bootflash", &kickstart.filename));
}

#[tokio::test]
async fn nxos_capacity_counts_both_images() {
    let device = MockDevice::new(OsFamily::NxOs, "n3000", "n3000-uk9.6.0.2.U6.5.bin")
        .flags(|f| f.nxos_kickstart_image = Some("n3000-uk9-kickstart.6.0.2.U6.5.bin".into()))
        .area("bootflash", 200_000_000);

    let (result, _) = run(&device, &options()).await;

    assert_eq!(result.unwrap_err().kind(), RunErrorKind::Capacity);
}

#[tokio::test]
async fn non_admin_asa_context_is_rejected() {
    let device = MockDevice::new(OsFamily::Asa, "asa", "asa9-8-4-smp-k8.bin")
        .flags(|f| f.asa_multi_context = true)
        .area("disk0", 1 << 30);

    let (result, _) = run(&device, &options()).await;

    assert_eq!(result.unwrap_err().kind(), RunErrorKind::Precondition);
    assert!(device.commands().is_empty());
}

/// Session that answers every command like a CLI that rejects it.
#[derive(Default)]
struct RejectingSession {
    log: Mutex<Vec<String>>,
}

#[async_trait]
impl CommandSession for RejectingSession {
    async fn send(&self, command: &str) -> Result<String, SessionError> {
        self.log.lock().push(command.to_string());
        Ok("% Invalid input detected at '^' marker.".to_string())
    }

    async fn send_long(&self, command: &str, _timeout: Duration, _terminator: &str) -> Result<String, SessionError> {
        self.send(command).await
    }
}

#[tokio::test]
async fn unsupported_context_is_refused_before_querying_the_device() {
    support::init_tracing();
    let profile: DeviceProfile = serde_yaml::from_str(
        "os: asa\nplatform: asa\nrunning_image: asa9-8-4-smp-k8.bin\nsystem_fs: disk0\nflags:\n  asa_multi_context: true\n",
    )
    .unwrap();
    let session = RejectingSession::default();
    let facts = CliFacts::new(&session, "fw-ctx1", profile);
    let registry = registry();
    let options = options();
    let mut diag = Diagnostics::default();

    let result = Orchestrator::new(&session, &facts, &registry, &options)
        .run(&mut diag)
        .await;

    assert_eq!(result.unwrap_err().kind(), RunErrorKind::Precondition);
    assert!(session.log.lock().is_empty());
}

#[tokio::test]
async fn regional_repository_is_resolved_from_the_registry() {
    let device = c3560cx(16_000_000);
    let options = RunOptions {
        repository: RepositorySource::Region {
            list: "Cisco OS SW Regional Repos".into(),
            region: "EMEA".into(),
        },
        ..options()
    };

    let (result, _) = run(&device, &options).await;

    assert!(result.is_ok());
    assert_eq!(device.count("copy http://10.20.0.5/pub/cisco/"), 1);
}

#[tokio::test]
async fn unknown_region_fails_before_any_copy() {
    let device = c3560cx(16_000_000);
    let options = RunOptions {
        repository: RepositorySource::Region {
            list: "Cisco OS SW Regional Repos".into(),
            region: "APAC".into(),
        },
        ..options()
    };

    let (result, _) = run(&device, &options).await;

    assert_eq!(result.unwrap_err().kind(), RunErrorKind::Lookup);
    assert!(device.mutations().is_empty());
}

#[tokio::test]
async fn running_image_off_default_area_warns() {
    let device = c3560cx(16_000_000).area("flash2", 16_000_000).running_image_fs("flash2");

    let (result, diag) = run(&device, &options()).await;

    assert!(result.is_ok());
    assert!(
        diag.warnings()
            .iter()
            .any(|w| w.kind == WarningKind::RunningImageLocation)
    );
}
