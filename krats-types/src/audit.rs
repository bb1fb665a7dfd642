//! Audit entry types and the sink every component writes through.

use crate::ids::ActorId;
use crate::timestamp::AuditTimestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A security-relevant action recorded in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum AuditAction {
    Login,
    LoginFailed,
    LoginLocked,
    Logout,
    PasswordChanged,
    PasswordRejected,
    UserCreated,
    SessionExpired,
    KeyGenerated,
    DecryptFailed,
    PiiRead,
    PiiWrite,
    LicenseChecked,
    LicenseActivated,
    LicenseRejected,
    /// Collaborator-defined action, stored verbatim (upper-cased).
    Custom(String),
}

impl AuditAction {
    /// Returns the stored representation of this action.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Login => "LOGIN",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::LoginLocked => "LOGIN_LOCKED",
            Self::Logout => "LOGOUT",
            Self::PasswordChanged => "PASSWORD_CHANGED",
            Self::PasswordRejected => "PASSWORD_REJECTED",
            Self::UserCreated => "USER_CREATED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::KeyGenerated => "KEY_GENERATED",
            Self::DecryptFailed => "DECRYPT_FAILED",
            Self::PiiRead => "PII_READ",
            Self::PiiWrite => "PII_WRITE",
            Self::LicenseChecked => "LICENSE_CHECKED",
            Self::LicenseActivated => "LICENSE_ACTIVATED",
            Self::LicenseRejected => "LICENSE_REJECTED",
            Self::Custom(s) => s,
        }
    }

    /// Creates a collaborator-defined action.
    #[must_use]
    pub fn custom(name: &str) -> Self {
        let normalized = name.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        normalized.parse().unwrap_or(Self::Custom(normalized))
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "LOGIN" => Self::Login,
            "LOGIN_FAILED" => Self::LoginFailed,
            "LOGIN_LOCKED" => Self::LoginLocked,
            "LOGOUT" => Self::Logout,
            "PASSWORD_CHANGED" => Self::PasswordChanged,
            "PASSWORD_REJECTED" => Self::PasswordRejected,
            "USER_CREATED" => Self::UserCreated,
            "SESSION_EXPIRED" => Self::SessionExpired,
            "KEY_GENERATED" => Self::KeyGenerated,
            "DECRYPT_FAILED" => Self::DecryptFailed,
            "PII_READ" => Self::PiiRead,
            "PII_WRITE" => Self::PiiWrite,
            "LICENSE_CHECKED" => Self::LicenseChecked,
            "LICENSE_ACTIVATED" => Self::LicenseActivated,
            "LICENSE_REJECTED" => Self::LicenseRejected,
            other if !other.is_empty() && !other.chars().any(char::is_control) => {
                Self::Custom(other.to_string())
            }
            other => return Err(crate::Error::UnknownAction(other.to_string())),
        })
    }
}

impl From<AuditAction> for String {
    fn from(action: AuditAction) -> Self {
        action.as_str().to_string()
    }
}

impl TryFrom<String> for AuditAction {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Result of the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

impl AuditOutcome {
    /// Returns the stored representation of this outcome.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Denied => "denied",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditOutcome {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "denied" => Ok(Self::Denied),
            other => Err(crate::Error::UnknownOutcome(other.to_string())),
        }
    }
}

/// One row of the audit trail.
///
/// The `timestamp` set at construction is provisional: the sink replaces it
/// with a value from its own monotonic clock at append time so that
/// timestamp order always equals write order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: AuditTimestamp,
    pub actor_id: ActorId,
    pub action: AuditAction,
    /// What the action touched (a username, a table/column, a redacted
    /// license id). Never secret material or plaintext PII.
    pub target: String,
    pub outcome: AuditOutcome,
}

impl AuditEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(
        actor_id: ActorId,
        action: AuditAction,
        target: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            timestamp: AuditTimestamp::now(),
            actor_id,
            action,
            target: target.into(),
            outcome,
        }
    }

    /// Creates an entry attributed to the system actor.
    #[must_use]
    pub fn system(action: AuditAction, target: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self::new(ActorId::system(), action, target, outcome)
    }
}

/// Failure to append an audit entry.
///
/// Non-fatal by contract: the caller logs it and completes the operation
/// the entry describes.
#[derive(Debug, Clone, thiserror::Error)]
#[error("audit write failed: {reason} (fallback persisted: {fallback_persisted})")]
pub struct AuditWriteError {
    pub reason: String,
    pub fallback_persisted: bool,
}

/// Append-only destination for audit entries.
pub trait AuditSink: Send + Sync {
    /// Appends `entry` and returns its sequence number.
    fn record(&self, entry: AuditEntry) -> Result<u64, AuditWriteError>;
}

/// In-memory sink for tests and headless tools.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
    failing: AtomicBool,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `record` call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns a copy of all entries in append order.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns the entries recorded for `action`.
    #[must_use]
    pub fn with_action(&self, action: &AuditAction) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| &e.action == action)
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, mut entry: AuditEntry) -> Result<u64, AuditWriteError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditWriteError {
                reason: "memory sink set to fail".to_string(),
                fallback_persisted: false,
            });
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(last) = entries.last() {
            entry.timestamp = last.timestamp.tick();
        }
        entries.push(entry);
        Ok(entries.len() as u64)
    }
}
