//! Error types for configuration and startup.

use krats_audit::AuditError;
use krats_auth::AuthError;
use krats_crypto::{CryptoError, EncryptionError};
use krats_license::{LicenseError, LicenseStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration file errors. A config that exists but cannot be used is
/// never replaced by defaults.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Why the trust core refused to start.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The license gate did not pass. Nothing else was built.
    #[error("license check failed: {0}")]
    License(LicenseStatus),

    /// The license file or signing secret could not be read.
    #[error("license check could not run: {0}")]
    LicenseUnavailable(#[source] LicenseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("key store: {0}")]
    Crypto(#[from] CryptoError),

    #[error("encryption: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("security manager: {0}")]
    Auth(#[from] AuthError),

    #[error("audit log: {0}")]
    Audit(#[from] AuditError),
}

impl From<LicenseError> for StartupError {
    fn from(err: LicenseError) -> Self {
        match err.status() {
            Some(status) => Self::License(status),
            None => Self::LicenseUnavailable(err),
        }
    }
}

impl StartupError {
    /// Returns the license status if startup stopped at the license gate.
    #[must_use]
    pub fn license_status(&self) -> Option<LicenseStatus> {
        match self {
            Self::License(status) => Some(*status),
            _ => None,
        }
    }
}

/// Errors from the core service channel.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("core service has shut down")]
    Closed,

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Audit(#[from] krats_types::AuditWriteError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
pub type StartupResult<T> = Result<T, StartupError>;
pub type ServiceResult<T> = Result<T, ServiceError>;
