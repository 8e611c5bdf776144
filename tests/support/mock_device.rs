// ABOUTME: Scripted in-memory Cisco device for integration tests.
// ABOUTME: Simulates storage areas, copy outcomes and verification, and records every command.

use async_trait::async_trait;
use imgxfer::catalog::ImageRecord;
use imgxfer::device::{DeviceContext, DeviceFacts, FactsError, FactsSource, ModeFlags, OsFamily, StorageArea};
use imgxfer::session::{CommandSession, SessionError};
use parking_lot::Mutex;
use regex::Regex;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

/// What the next `copy http://...` does.
#[derive(Debug, Clone)]
pub enum CopyOutcome {
    /// Writes the full image and prints a success trailer.
    Success,
    /// Prints `text` and writes nothing.
    Output(String),
    /// Writes `bytes` bytes and prints a success trailer.
    Truncated(u64),
    /// The session raises a transport error.
    Transport(String),
    /// The session times out.
    Timeout,
}

#[derive(Debug)]
struct Area {
    capacity: u64,
    files: BTreeMap<String, u64>,
}

impl Area {
    fn used(&self) -> u64 {
        self.files.values().sum()
    }
}

#[derive(Debug)]
struct State {
    areas: Vec<(String, Area)>,
    copies: VecDeque<CopyOutcome>,
    verifications: VecDeque<bool>,
    /// Catalog records by filename, for sizes and hashes of successful copies.
    images: BTreeMap<String, ImageRecord>,
    log: Vec<String>,
}

impl State {
    fn area_mut(&mut self, name: &str) -> Option<&mut Area> {
        self.areas.iter_mut().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    fn area(&self, name: &str) -> Option<&Area> {
        self.areas.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }
}

pub struct MockDevice {
    identity: DeviceFacts,
    state: Mutex<State>,
    /// Ceiling applied by `send`, like a session's default timeout.
    command_timeout: Duration,
    /// How long the device takes to hash an image.
    verify_duration: Duration,
}

impl MockDevice {
    pub fn new(os: OsFamily, platform: &str, running_image: &str) -> Self {
        let system_fs = match os {
            OsFamily::NxOs => "bootflash",
            OsFamily::Asa => "disk0",
            OsFamily::Ios | OsFamily::IosXe => "flash",
        };
        Self {
            identity: DeviceFacts {
                hostname: "dut1".to_string(),
                os,
                platform: platform.to_string(),
                running_image: running_image.to_string(),
                running_image_fs: system_fs.to_string(),
                system_fs: system_fs.to_string(),
                storage: Vec::new(),
                network_view: "default".to_string(),
                flags: ModeFlags::default(),
            },
            state: Mutex::new(State {
                areas: Vec::new(),
                copies: VecDeque::new(),
                verifications: VecDeque::new(),
                images: BTreeMap::new(),
                log: Vec::new(),
            }),
            command_timeout: Duration::from_secs(60),
            verify_duration: Duration::ZERO,
        }
    }

    /// Add a storage area with `free` bytes of free space.
    pub fn area(self, name: &str, free: u64) -> Self {
        self.state.lock().areas.push((
            name.to_string(),
            Area {
                capacity: free,
                files: BTreeMap::new(),
            },
        ));
        self
    }

    /// Place a file on an area. Its size comes out of that area's capacity.
    pub fn file(self, area: &str, name: &str, size: u64) -> Self {
        {
            let mut state = self.state.lock();
            let a = state.area_mut(area).expect("area must exist");
            a.capacity += size;
            a.files.insert(name.to_string(), size);
        }
        self
    }

    pub fn image(self, record: &ImageRecord) -> Self {
        self.state
            .lock()
            .images
            .insert(record.filename.clone(), record.clone());
        self
    }

    pub fn copies(self, outcomes: impl IntoIterator<Item = CopyOutcome>) -> Self {
        self.state.lock().copies.extend(outcomes);
        self
    }

    pub fn verifications(self, results: impl IntoIterator<Item = bool>) -> Self {
        self.state.lock().verifications.extend(results);
        self
    }

    /// Make every verification take `duration` of simulated device time.
    pub fn verify_duration(mut self, duration: Duration) -> Self {
        self.verify_duration = duration;
        self
    }

    pub fn system_fs(mut self, name: &str) -> Self {
        self.identity.system_fs = name.to_string();
        self.identity.running_image_fs = name.to_string();
        self
    }

    pub fn running_image_fs(mut self, name: &str) -> Self {
        self.identity.running_image_fs = name.to_string();
        self
    }

    pub fn flags(mut self, f: impl FnOnce(&mut ModeFlags)) -> Self {
        f(&mut self.identity.flags);
        self
    }

    /// Every command sent, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Commands that change device storage.
    pub fn mutations(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with("copy") || c.starts_with("delete"))
            .collect()
    }

    pub fn has_file(&self, area: &str, name: &str) -> bool {
        self.state
            .lock()
            .area(area)
            .is_some_and(|a| a.files.contains_key(name))
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    fn listing(&self, spec: &str) -> String {
        let state = self.state.lock();
        let (area_name, pattern) = match spec.split_once(":/") {
            Some((area, rest)) => (area, rest),
            None => (spec.trim_end_matches(':'), ""),
        };
        let Some(area) = state.area(area_name) else {
            return format!("%Error opening {spec} (No such device)");
        };

        let mut out = format!("Directory of {area_name}:/\n\n");
        let mut matched = 0;
        for (i, (name, size)) in area.files.iter().enumerate() {
            let selected = if let Some(prefix) = pattern.strip_suffix('*') {
                name.starts_with(prefix)
            } else {
                pattern.is_empty() || name == pattern
            };
            if selected {
                matched += 1;
                out.push_str(&format!(
                    "{:>5}  -rw-  {size:>12}  Mar 1 2024 00:00:00 +00:00  {name}\n",
                    i + 1
                ));
            }
        }
        if !pattern.is_empty() && !pattern.ends_with('*') && matched == 0 {
            return format!("%Error opening {spec} (No such file or directory)");
        }
        let free = area.capacity.saturating_sub(area.used());
        out.push_str(&format!("\n{} bytes total ({free} bytes free)\n", area.capacity));
        out
    }

    fn delete(&self, command: &str) {
        if let Some((area, file)) = path_token(command) {
            let mut state = self.state.lock();
            if let Some(a) = state.area_mut(&area) {
                a.files.remove(&file);
            }
        }
    }

    fn verify(&self, command: &str) -> String {
        let Some((area, file)) = path_token(command) else {
            return "%Error: bad path".to_string();
        };
        let mut state = self.state.lock();
        let present = state.area(&area).is_some_and(|a| a.files.contains_key(&file));
        let ok = present && state.verifications.pop_front().unwrap_or(true);
        let md5 = state
            .images
            .get(&file)
            .and_then(|r| r.hash("md5"))
            .unwrap_or("")
            .to_string();

        if command.starts_with("show file") {
            if ok {
                md5
            } else {
                "00000000000000000000000000000000".to_string()
            }
        } else if ok {
            format!(".......Done!\nverify /md5 ({area}:/{file}) = {md5}\n\nVerified ({area}:/{file}) = {md5}")
        } else {
            format!("%Error verifying {area}:/{file}\nComputed signature does not match")
        }
    }

    fn timed_verify(&self, command: &str, timeout: Duration) -> Result<String, SessionError> {
        if self.verify_duration > timeout {
            return Err(SessionError::Timeout(timeout));
        }
        Ok(self.verify(command))
    }

    fn remote_copy(&self, command: &str) -> Result<String, SessionError> {
        let (area, file) = path_token_after_url(command).ok_or_else(|| SessionError::Transport("bad copy".into()))?;
        let mut state = self.state.lock();
        let outcome = state.copies.pop_front().unwrap_or(CopyOutcome::Success);
        let full = state.images.get(&file).map(|r| r.size).unwrap_or(1);
        let written = match &outcome {
            CopyOutcome::Success => Some(full),
            CopyOutcome::Truncated(n) => Some(*n),
            _ => None,
        };
        if let Some(bytes) = written
            && let Some(a) = state.area_mut(&area)
        {
            a.files.insert(file.clone(), bytes);
        }

        let nxos = self.identity.os == OsFamily::NxOs;
        match outcome {
            CopyOutcome::Success | CopyOutcome::Truncated(_) if nxos => Ok("Copy complete.".to_string()),
            CopyOutcome::Success | CopyOutcome::Truncated(_) => Ok(format!(
                "Accessing http://repo/{file}...\nLoading {file} !!!!!!!!\n[OK - {} bytes]\n\n{} bytes copied in 12.345 secs (1000 bytes/sec)",
                written.unwrap_or(0),
                written.unwrap_or(0)
            )),
            CopyOutcome::Output(text) => Ok(text),
            CopyOutcome::Transport(msg) => Err(SessionError::Transport(msg)),
            CopyOutcome::Timeout => Err(SessionError::Timeout(Duration::from_secs(1))),
        }
    }

    fn local_copy(&self, command: &str) {
        let tokens: Vec<&str> = command.split_whitespace().collect();
        let (Some(src), Some(dst)) = (tokens.get(1), tokens.get(2)) else {
            return;
        };
        let (Some(src), Some(dst)) = (split_path(src), split_path(dst.trim_end_matches('\r'))) else {
            return;
        };
        let mut state = self.state.lock();
        let size = state.area(&src.0).and_then(|a| a.files.get(&src.1).copied());
        if let Some(size) = size
            && let Some(a) = state.area_mut(&dst.0)
        {
            a.files.insert(dst.1, size);
        }
    }
}

fn is_verify(command: &str) -> bool {
    command.starts_with("verify /md5") || command.starts_with("show file")
}

fn split_path(token: &str) -> Option<(String, String)> {
    let (area, file) = token.split_once(":/")?;
    Some((area.to_string(), file.to_string()))
}

/// First `<area>:/<file>` token in a command.
fn path_token(command: &str) -> Option<(String, String)> {
    command
        .split_whitespace()
        .filter(|t| !t.starts_with("http"))
        .find_map(split_path)
}

fn path_token_after_url(command: &str) -> Option<(String, String)> {
    let mut tokens = command.split_whitespace().skip_while(|t| !t.starts_with("http://"));
    tokens.next()?;
    split_path(tokens.next()?.trim_end_matches('\r'))
}

/// Apply `| include` / `| exclude` stages like the device CLI does.
fn apply_filters(output: String, stages: &[&str]) -> String {
    let mut lines: Vec<String> = output.lines().map(str::to_string).collect();
    for stage in stages {
        let stage = stage.trim();
        let (keep, pattern) = if let Some(p) = stage.strip_prefix("include ") {
            (true, p)
        } else if let Some(p) = stage.strip_prefix("exclude ") {
            (false, p)
        } else {
            continue;
        };
        let re = Regex::new(pattern.trim()).expect("filter regex");
        lines.retain(|l| re.is_match(l) == keep);
    }
    lines.join("\n")
}

#[async_trait]
impl CommandSession for MockDevice {
    async fn send(&self, command: &str) -> Result<String, SessionError> {
        self.state.lock().log.push(command.to_string());

        let mut stages = command.split(" | ");
        let base = stages.next().unwrap_or("").trim();
        let filters: Vec<&str> = stages.collect();

        if base.starts_with("delete") {
            self.delete(base);
            return Ok(String::new());
        }
        if is_verify(base) {
            return self.timed_verify(base, self.command_timeout);
        }
        if let Some(spec) = base.strip_prefix("dir ").or_else(|| base.strip_prefix("show ")) {
            return Ok(apply_filters(self.listing(spec.trim()), &filters));
        }
        Ok(String::new())
    }

    async fn send_long(&self, command: &str, timeout: Duration, _terminator: &str) -> Result<String, SessionError> {
        self.state.lock().log.push(command.to_string());
        if is_verify(command) {
            self.timed_verify(command, timeout)
        } else if command.contains("http://") {
            self.remote_copy(command)
        } else {
            self.local_copy(command);
            Ok(String::new())
        }
    }
}

#[async_trait]
impl FactsSource for MockDevice {
    fn context(&self) -> DeviceContext {
        self.identity.context()
    }

    async fn refresh(&self) -> Result<DeviceFacts, FactsError> {
        let state = self.state.lock();
        let mut facts = self.identity.clone();
        facts.storage = state
            .areas
            .iter()
            .map(|(name, area)| StorageArea::new(name, area.capacity.saturating_sub(area.used())))
            .collect();
        Ok(facts)
    }

    async fn file_size(&self, area: &str, filename: &str) -> Result<Option<u64>, FactsError> {
        Ok(self
            .state
            .lock()
            .area(area)
            .and_then(|a| a.files.get(filename).copied()))
    }
}
