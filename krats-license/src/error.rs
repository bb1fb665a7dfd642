//! Error types for the licensing module.

use crate::manager::LicenseStatus;
use thiserror::Error;

/// Licensing-specific errors.
///
/// `Missing`, `Tampered`, `HardwareMismatch` and `Expired` are fatal to
/// startup and never retried; the operator must activate a new license.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// No license has been activated on this machine.
    #[error("no license is activated")]
    Missing,

    /// The license does not verify against the signing secret.
    #[error("license signature invalid")]
    Tampered,

    /// The license was issued for another machine.
    #[error("license is bound to a different machine")]
    HardwareMismatch,

    /// The license is past its expiry date.
    #[error("license has expired")]
    Expired,

    /// The key text is not `payload.signature` with a decodable payload.
    #[error("invalid license key format: {0}")]
    InvalidKeyFormat(String),

    /// The licensed seat count is used up.
    #[error("seat limit reached ({current}/{limit})")]
    SeatLimitExceeded { limit: u32, current: u32 },

    /// The license file could not be read or written.
    #[error("license storage error: {0}")]
    Storage(String),

    /// The signing secret could not be resolved or used.
    #[error("license signing secret unavailable: {0}")]
    Secret(String),

    /// Payload serialization failed while issuing.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LicenseError {
    /// Maps a non-valid status to its error. `Valid` and `Unvalidated` have none.
    #[must_use]
    pub fn from_status(status: LicenseStatus) -> Option<Self> {
        match status {
            LicenseStatus::Missing => Some(Self::Missing),
            LicenseStatus::Tampered => Some(Self::Tampered),
            LicenseStatus::HardwareMismatch => Some(Self::HardwareMismatch),
            LicenseStatus::Expired => Some(Self::Expired),
            LicenseStatus::Valid | LicenseStatus::Unvalidated => None,
        }
    }

    /// Returns the status this error reports, if it is a status error.
    #[must_use]
    pub fn status(&self) -> Option<LicenseStatus> {
        match self {
            Self::Missing => Some(LicenseStatus::Missing),
            Self::Tampered => Some(LicenseStatus::Tampered),
            Self::HardwareMismatch => Some(LicenseStatus::HardwareMismatch),
            Self::Expired => Some(LicenseStatus::Expired),
            _ => None,
        }
    }
}

impl From<krats_crypto::CryptoError> for LicenseError {
    fn from(err: krats_crypto::CryptoError) -> Self {
        Self::Secret(err.to_string())
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
