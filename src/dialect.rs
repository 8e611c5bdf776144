// ABOUTME: Per-OS command dialects: listing, deletion, copy and verification syntax.
// ABOUTME: Adding a platform family means adding one Dialect implementation.

use crate::device::OsFamily;
use crate::transfer::FailureCause;
use regex::Regex;
use std::sync::OnceLock;

/// Command syntax and output interpretation for one OS family.
pub trait Dialect: Send + Sync {
    /// Copy `url` to `<fs>:/<filename>`.
    fn copy_command(&self, url: &str, fs: &str, filename: &str) -> String;

    /// Inspect copy output for a failure signal. `None` means no failure was
    /// signalled and the caller must confirm the transfer by size.
    fn classify_copy_output(&self, output: &str) -> Option<FailureCause>;

    /// Delete a partially transferred file before a retry.
    fn delete_partial_command(&self, fs: &str, filename: &str) -> String;

    /// Delete an obsolete image during cleanup.
    fn delete_image_command(&self, fs: &str, filename: &str) -> String;

    /// List candidate images for `platform` on `fs`.
    fn list_images_command(&self, fs: &str, platform: &str) -> String;

    /// List kickstart images, for families that carry them.
    fn list_kickstart_command(&self, _fs: &str, _platform: &str) -> Option<String> {
        None
    }

    /// List install-mode packages and images, for families that support it.
    fn list_packages_command(&self, _fs: &str, _platform: &str) -> Option<String> {
        None
    }

    /// Extract a filename from one listing line.
    fn parse_listing_line(&self, line: &str, platform: &str) -> Option<String> {
        platform_token(line, platform)
    }

    /// Hash-verification command for an MD5 digest.
    fn verify_command(&self, fs: &str, filename: &str, md5: &str) -> String;

    /// Interpret verification output.
    fn verification_passed(&self, output: &str, md5: &str) -> bool;

    /// Copy an image between local storage areas, where supported.
    fn secondary_copy_command(&self, _from: &str, _to: &str, _filename: &str) -> Option<String> {
        None
    }
}

/// IOS and IOS-XE.
#[derive(Debug, Clone, Copy, Default)]
pub struct IosDialect;

/// NX-OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct NxosDialect;

/// Adaptive Security Appliance.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsaDialect;

/// Dialect for an OS family.
pub fn dialect_for(os: OsFamily) -> &'static dyn Dialect {
    match os {
        OsFamily::Ios | OsFamily::IosXe => &IosDialect,
        OsFamily::NxOs => &NxosDialect,
        OsFamily::Asa => &AsaDialect,
    }
}

impl Dialect for IosDialect {
    fn copy_command(&self, url: &str, fs: &str, filename: &str) -> String {
        // Trailing carriage returns answer the destination and overwrite prompts.
        format!("copy {url} {fs}:/{filename}\r\r\r")
    }

    fn classify_copy_output(&self, output: &str) -> Option<FailureCause> {
        classify_status_line(last_line(output))
    }

    fn delete_partial_command(&self, fs: &str, filename: &str) -> String {
        format!("delete /force {fs}:/{filename}")
    }

    fn delete_image_command(&self, fs: &str, filename: &str) -> String {
        format!("delete /force /recursive {fs}:/{filename}")
    }

    fn list_images_command(&self, fs: &str, platform: &str) -> String {
        format!("dir {fs}: | include {platform}.*(\\.SPA$|\\.bin$)")
    }

    fn list_packages_command(&self, fs: &str, platform: &str) -> Option<String> {
        Some(format!("dir {fs}:/{platform}* | include \\.bin|\\.pkg"))
    }

    fn verify_command(&self, fs: &str, filename: &str, md5: &str) -> String {
        format!("verify /md5 {fs}:/{filename} {md5}")
    }

    fn verification_passed(&self, output: &str, _md5: &str) -> bool {
        output.lines().any(|line| line.contains("Verified"))
    }

    fn secondary_copy_command(&self, from: &str, to: &str, filename: &str) -> Option<String> {
        Some(format!("copy {from}:/{filename} {to}:/{filename}\r\r\r"))
    }
}

impl Dialect for AsaDialect {
    fn copy_command(&self, url: &str, fs: &str, filename: &str) -> String {
        format!("copy /noconfirm {url} {fs}:/{filename}")
    }

    fn classify_copy_output(&self, output: &str) -> Option<FailureCause> {
        // A broken pipe leaves a truncated file with no error; only the
        // size check catches it.
        classify_status_line(last_line(output))
    }

    fn delete_partial_command(&self, fs: &str, filename: &str) -> String {
        format!("delete /noconfirm {fs}:/{filename}")
    }

    fn delete_image_command(&self, fs: &str, filename: &str) -> String {
        format!("delete /noconfirm /recursive {fs}:/{filename}")
    }

    fn list_images_command(&self, fs: &str, platform: &str) -> String {
        // ASA cannot pipe `dir`; `show <fs>:` can be.
        format!("show {fs}: | include {platform}.*(\\.SPA$|\\.bin$)")
    }

    fn verify_command(&self, fs: &str, filename: &str, md5: &str) -> String {
        format!("verify /md5 {fs}:/{filename} {md5}")
    }

    fn verification_passed(&self, output: &str, _md5: &str) -> bool {
        output.lines().any(|line| line.contains("Verified"))
    }
}

impl Dialect for NxosDialect {
    fn copy_command(&self, url: &str, fs: &str, filename: &str) -> String {
        format!("copy {url} {fs}:/{filename} vrf default")
    }

    fn classify_copy_output(&self, output: &str) -> Option<FailureCause> {
        let mut status = 0u32;
        for line in output.lines() {
            if line.contains("Copy complete") {
                status = 0;
            } else if let Some(caps) = curl_re().captures(line)
                && let Ok(code) = caps[1].parse()
            {
                status = code;
            }
        }
        curl_cause(status)
    }

    fn delete_partial_command(&self, fs: &str, filename: &str) -> String {
        format!("delete {fs}:/{filename} no-prompt")
    }

    fn delete_image_command(&self, fs: &str, filename: &str) -> String {
        format!("delete {fs}:/{filename} no-prompt")
    }

    fn list_images_command(&self, fs: &str, platform: &str) -> String {
        format!("dir {fs}: | include {platform}.*\\.bin$ | exclude kickstart")
    }

    fn list_kickstart_command(&self, fs: &str, platform: &str) -> Option<String> {
        Some(format!("dir {fs}: | include {platform}.*\\.bin$ | include kickstart"))
    }

    fn parse_listing_line(&self, line: &str, _platform: &str) -> Option<String> {
        // NX-OS listings end with the bare filename.
        let last = line.split_whitespace().last()?;
        let name = last.rsplit('/').next().unwrap_or(last);
        (!name.is_empty() && !name.ends_with(':')).then(|| name.to_string())
    }

    fn verify_command(&self, fs: &str, filename: &str, _md5: &str) -> String {
        format!("show file {fs}:/{filename} md5sum")
    }

    fn verification_passed(&self, output: &str, md5: &str) -> bool {
        last_line(output).trim().eq_ignore_ascii_case(md5.trim())
    }
}

/// Map a curl exit code reported by NX-OS to a failure cause.
pub fn curl_cause(code: u32) -> Option<FailureCause> {
    match code {
        0 => None,
        // couldn't resolve host, couldn't connect, HTTP error (404)
        6 | 7 | 22 => Some(FailureCause::HostUnresponsiveOrNotFound),
        // partial file
        18 => Some(FailureCause::InterruptedTransfer),
        _ => Some(FailureCause::GeneralError),
    }
}

/// Signatures meaning the repository could not be reached or the file is missing.
const HOST_SIGNATURES: [&str; 7] = [
    "ERR_OPEN",
    "Error opening",
    "404 Not Found",
    "Connection refused",
    "unreachable",
    "Unreachable",
    "resolve",
];

pub(crate) fn is_host_signature(text: &str) -> bool {
    HOST_SIGNATURES.iter().any(|sig| text.contains(sig))
}

/// Classify the `%`-marked status line printed by IOS, IOS-XE and ASA.
pub(crate) fn classify_status_line(line: &str) -> Option<FailureCause> {
    if !line.contains('%') {
        return None;
    }
    let fragment = status_re()
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or("Unknown");

    let cause = if is_host_signature(fragment) || is_host_signature(line) {
        FailureCause::HostUnresponsiveOrNotFound
    } else if fragment.contains("API_ERR") {
        FailureCause::ApiError
    } else if fragment.contains("Broken pipe")
        || line.contains("Error reading")
        || line.contains("Signature not valid")
    {
        FailureCause::InterruptedTransfer
    } else {
        FailureCause::GeneralError
    };
    tracing::debug!(status = line, fragment, ?cause, "classified transfer status");
    Some(cause)
}

fn last_line(output: &str) -> &str {
    output
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
}

fn status_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%.*\((.*)\)").expect("static regex"))
}

fn curl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"curl:\s+\((\d+)\)").expect("static regex"))
}

/// First whitespace-preceded token starting with `platform`.
fn platform_token(line: &str, platform: &str) -> Option<String> {
    let re = Regex::new(&format!(r"\s({}\S+)", regex::escape(platform))).ok()?;
    re.captures(line).map(|c| c[1].to_string())
}
