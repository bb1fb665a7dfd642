//! Identifier types used throughout the trust core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum length of an actor identifier.
const MAX_ACTOR_LEN: usize = 128;

/// Identifies who performed an audited action.
///
/// Either a username / user id supplied by the data layer, or the reserved
/// `system` actor used for actions the core takes on its own (key
/// generation, license checks at startup, background monitors).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// The reserved identifier for actions taken by the core itself.
    pub const SYSTEM: &'static str = "system";

    /// Creates an actor id, rejecting empty, oversized, or control-character
    /// input so that audit rows stay printable.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(crate::Error::InvalidActor("actor id is empty".to_string()));
        }
        if trimmed.len() > MAX_ACTOR_LEN {
            return Err(crate::Error::InvalidActor(format!(
                "actor id exceeds {MAX_ACTOR_LEN} bytes"
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(crate::Error::InvalidActor(
                "actor id contains control characters".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the system actor.
    #[must_use]
    pub fn system() -> Self {
        Self(Self::SYSTEM.to_string())
    }

    /// Returns true if this is the system actor.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.0 == Self::SYSTEM
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ActorId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Unique identifier of an issued license.
///
/// Uses UUID v7 so ids sort by issue time. The id is not secret; its short
/// prefix is what gets logged in place of the license key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LicenseId(Uuid);

impl LicenseId {
    /// Creates a new license ID with the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a license ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Returns the short form used in log lines.
    #[must_use]
    pub fn redacted(&self) -> String {
        let simple = self.0.simple().to_string();
        format!("lic-{}", &simple[..8])
    }
}

impl Default for LicenseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LicenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LicenseId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
