//! Hardware fingerprinting for license binding.
//!
//! Combines durable machine identifiers into a salted, truncated hash so
//! that a license can be bound to one machine without exposing the raw
//! identifiers in logs or license files.
//!
//! Sources are split by how often they change. Stable sources (OS machine
//! id, board/product UUID, platform serial) are preferred; volatile ones
//! (MAC address, hostname) only contribute when fewer than two stable
//! identifiers can be read, so swapping a network adapter does not
//! invalidate every issued license on a well-identified machine.
//!
//! On Linux the DMI files (`product_uuid`, `board_serial`) are readable by
//! root only. A fingerprint taken as root can therefore differ from one
//! taken by the service account; [`FingerprintReport`] names the
//! privileged sources involved so operators can tell.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Default salt mixed into every fingerprint.
pub const DEFAULT_HARDWARE_SALT: &str = "krats-hwid-v1";

/// Number of stable identifiers that makes volatile ones unnecessary.
const MIN_STABLE_SOURCES: usize = 2;

/// Values firmware vendors ship in place of a real identifier.
const PLACEHOLDER_VALUES: &[&str] = &[
    "none",
    "unknown",
    "default string",
    "to be filled by o.e.m.",
    "not specified",
    "system serial number",
    "0123456789",
    "00000000-0000-0000-0000-000000000000",
    "ffffffff-ffff-ffff-ffff-ffffffffffff",
];

/// A normalized machine identifier: `XXXX-XXXX-XXXX-XXXX`, upper-case hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HardwareId(String);

impl HardwareId {
    fn from_digest(digest: &[u8]) -> Self {
        let hex = hex::encode_upper(&digest[..8]);
        let groups: Vec<&str> = (0..4).map(|i| &hex[i * 4..i * 4 + 4]).collect();
        Self(groups.join("-"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HardwareId {
    type Err = String;

    /// Accepts any case and surrounding whitespace; stores upper case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        let groups: Vec<&str> = normalized.split('-').collect();
        let well_formed = groups.len() == 4
            && groups
                .iter()
                .all(|g| g.len() == 4 && g.chars().all(|c| c.is_ascii_hexdigit()));
        if well_formed {
            Ok(Self(normalized))
        } else {
            Err(format!("hardware id must look like XXXX-XXXX-XXXX-XXXX, got {s:?}"))
        }
    }
}

impl TryFrom<String> for HardwareId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HardwareId> for String {
    fn from(id: HardwareId) -> Self {
        id.0
    }
}

/// How likely an identifier is to change over a machine's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Stable,
    Volatile,
}

/// One durable machine attribute.
pub trait IdentifierSource: Send + Sync {
    /// Short name mixed into the hash alongside the value.
    fn name(&self) -> &'static str;

    /// Whether this attribute survives ordinary hardware maintenance.
    fn stability(&self) -> Stability;

    /// Reads the attribute, or `None` if unavailable on this machine.
    fn read(&self) -> Option<String>;

    /// Whether only a privileged account can read the attribute.
    fn requires_privilege(&self) -> bool {
        false
    }
}

/// A fixed value, for tests and for hosts that provision their own id.
#[derive(Debug, Clone)]
pub struct StaticSource {
    name: &'static str,
    stability: Stability,
    value: Option<String>,
    privileged: bool,
}

impl StaticSource {
    #[must_use]
    pub fn stable(name: &'static str, value: Option<&str>) -> Self {
        Self {
            name,
            stability: Stability::Stable,
            value: value.map(str::to_string),
            privileged: false,
        }
    }

    #[must_use]
    pub fn volatile(name: &'static str, value: Option<&str>) -> Self {
        Self {
            name,
            stability: Stability::Volatile,
            value: value.map(str::to_string),
            privileged: false,
        }
    }

    /// Marks the source as readable by privileged accounts only.
    #[must_use]
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }
}

impl IdentifierSource for StaticSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn stability(&self) -> Stability {
        self.stability
    }

    fn read(&self) -> Option<String> {
        self.value.clone()
    }

    fn requires_privilege(&self) -> bool {
        self.privileged
    }
}

/// OS installation id (`/etc/machine-id`, `IOPlatformUUID`).
#[derive(Debug, Clone, Copy, Default)]
pub struct MachineIdSource;

impl IdentifierSource for MachineIdSource {
    fn name(&self) -> &'static str {
        "machine-id"
    }

    fn stability(&self) -> Stability {
        Stability::Stable
    }

    fn read(&self) -> Option<String> {
        #[cfg(target_os = "linux")]
        {
            read_trimmed("/etc/machine-id").or_else(|| read_trimmed("/var/lib/dbus/machine-id"))
        }

        #[cfg(target_os = "macos")]
        {
            ioreg_platform_value("IOPlatformUUID")
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            None
        }
    }
}

/// Firmware product UUID (`/sys/class/dmi/id/product_uuid`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductUuidSource;

impl IdentifierSource for ProductUuidSource {
    fn name(&self) -> &'static str {
        "product-uuid"
    }

    fn stability(&self) -> Stability {
        Stability::Stable
    }

    fn read(&self) -> Option<String> {
        #[cfg(target_os = "linux")]
        {
            read_trimmed("/sys/class/dmi/id/product_uuid")
        }

        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }

    fn requires_privilege(&self) -> bool {
        cfg!(target_os = "linux")
    }
}

/// Board or platform serial number.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformSerialSource;

impl IdentifierSource for PlatformSerialSource {
    fn name(&self) -> &'static str {
        "platform-serial"
    }

    fn stability(&self) -> Stability {
        Stability::Stable
    }

    fn read(&self) -> Option<String> {
        #[cfg(target_os = "linux")]
        {
            read_trimmed("/sys/class/dmi/id/board_serial")
                .or_else(|| read_trimmed("/sys/class/dmi/id/product_serial"))
        }

        #[cfg(target_os = "macos")]
        {
            ioreg_platform_value("IOPlatformSerialNumber")
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            None
        }
    }

    fn requires_privilege(&self) -> bool {
        cfg!(target_os = "linux")
    }
}

/// MAC address of the first physical network interface.
#[derive(Debug, Clone, Copy, Default)]
pub struct MacAddressSource;

impl IdentifierSource for MacAddressSource {
    fn name(&self) -> &'static str {
        "mac-address"
    }

    fn stability(&self) -> Stability {
        Stability::Volatile
    }

    fn read(&self) -> Option<String> {
        #[cfg(target_os = "linux")]
        {
            let mut interfaces: Vec<_> = std::fs::read_dir("/sys/class/net")
                .ok()?
                .filter_map(Result::ok)
                .filter(|entry| entry.path().join("device").exists())
                .collect();
            interfaces.sort_by_key(std::fs::DirEntry::file_name);
            interfaces
                .iter()
                .filter_map(|entry| read_trimmed(entry.path().join("address")))
                .find(|mac| mac != "00:00:00:00:00:00")
        }

        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }
}

/// The machine's hostname.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostnameSource;

impl IdentifierSource for HostnameSource {
    fn name(&self) -> &'static str {
        "hostname"
    }

    fn stability(&self) -> Stability {
        Stability::Volatile
    }

    fn read(&self) -> Option<String> {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .map(|h| h.to_lowercase())
    }
}

/// Which sources a fingerprint was computed from. Names only, never values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintReport {
    pub hardware_id: HardwareId,
    pub sources: Vec<&'static str>,
    pub used_volatile: bool,
    /// Root-only sources that contributed. Another account computes a
    /// different id.
    pub privileged: Vec<&'static str>,
    /// Root-only sources this account could not read. Root computes a
    /// different id.
    pub unreadable_privileged: Vec<&'static str>,
}

impl FingerprintReport {
    /// Returns true if the id depends on the privileges of the caller.
    #[must_use]
    pub fn depends_on_privilege(&self) -> bool {
        !self.privileged.is_empty() || !self.unreadable_privileged.is_empty()
    }
}

/// Computes the [`HardwareId`] of the current machine.
pub struct HardwareFingerprint {
    salt: String,
    sources: Vec<Box<dyn IdentifierSource>>,
}

impl HardwareFingerprint {
    /// Uses the platform's built-in sources.
    #[must_use]
    pub fn system(salt: impl Into<String>) -> Self {
        Self::with_sources(
            salt,
            vec![
                Box::new(MachineIdSource),
                Box::new(ProductUuidSource),
                Box::new(PlatformSerialSource),
                Box::new(MacAddressSource),
                Box::new(HostnameSource),
            ],
        )
    }

    /// Uses an explicit source list.
    #[must_use]
    pub fn with_sources(salt: impl Into<String>, sources: Vec<Box<dyn IdentifierSource>>) -> Self {
        Self {
            salt: salt.into(),
            sources,
        }
    }

    /// Computes the machine's identifier. Never fails: unreadable sources
    /// are skipped and the OS/arch pair is the last resort.
    #[must_use]
    pub fn compute(&self) -> HardwareId {
        self.compute_report().hardware_id
    }

    /// Computes the identifier and reports which sources contributed.
    #[must_use]
    pub fn compute_report(&self) -> FingerprintReport {
        let mut stable = Vec::new();
        let mut volatile = Vec::new();
        let mut unreadable_privileged = Vec::new();
        for source in &self.sources {
            match source.read().and_then(|v| usable(&v)) {
                Some(value) => match source.stability() {
                    Stability::Stable => stable.push((source.name(), value)),
                    Stability::Volatile => volatile.push((source.name(), value)),
                },
                None => {
                    debug!("Hardware identifier {} unavailable", source.name());
                    if source.requires_privilege() {
                        unreadable_privileged.push(source.name());
                    }
                }
            }
        }

        let used_volatile = stable.len() < MIN_STABLE_SOURCES && !volatile.is_empty();
        let mut parts = stable;
        if used_volatile {
            debug!("Fewer than {} stable identifiers; adding volatile ones", MIN_STABLE_SOURCES);
            parts.extend(volatile);
        }
        if parts.is_empty() {
            debug!("No hardware identifiers readable; falling back to OS and architecture");
            parts.push(("os", env::consts::OS.to_string()));
            parts.push(("arch", env::consts::ARCH.to_string()));
        }
        parts.sort_by(|a, b| a.0.cmp(b.0));

        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update([0u8]);
        for (name, value) in &parts {
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }

        let privileged = self
            .sources
            .iter()
            .filter(|s| s.requires_privilege() && parts.iter().any(|(name, _)| *name == s.name()))
            .map(|s| s.name())
            .collect();

        FingerprintReport {
            hardware_id: HardwareId::from_digest(&hasher.finalize()),
            sources: parts.iter().map(|(name, _)| *name).collect(),
            used_volatile,
            privileged,
            unreadable_privileged,
        }
    }
}

impl fmt::Debug for HardwareFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareFingerprint")
            .field("sources", &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

fn usable(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let lower = trimmed.to_ascii_lowercase();
    if trimmed.is_empty() || PLACEHOLDER_VALUES.contains(&lower.as_str()) {
        None
    } else {
        Some(lower)
    }
}

#[cfg(target_os = "linux")]
fn read_trimmed(path: impl AsRef<std::path::Path>) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(target_os = "macos")]
fn ioreg_platform_value(key: &str) -> Option<String> {
    std::process::Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()
        .ok()
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .and_then(|output| {
            output
                .lines()
                .find(|l| l.contains(key))
                .and_then(|l| l.split('"').nth(3))
                .map(String::from)
        })
}
