//! Trust core configuration, read from `config.toml` in the data directory.
//!
//! Every section and field has a default, so an empty or missing file gives
//! a working configuration. A file that exists but does not parse is an
//! error: security settings never fall back silently.

use crate::capability::Capability;
use crate::error::{ConfigError, ConfigResult};
use krats_auth::{AuthConfig, HashingParams, MAX_WINDOW_SECS, PasswordPolicy, ThrottleConfig};
use krats_crypto::SecretKind;
use krats_license::{DEFAULT_HARDWARE_SALT, LICENSE_FILE_NAME};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Name of the config file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Longest accepted session inactivity timeout (30 days).
pub const MAX_INACTIVITY_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

/// Name of the audit database inside the data directory.
pub const AUDIT_DB_FILE_NAME: &str = "audit.db";

const DEFAULT_DIR_NAME: &str = ".krats";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Holds `license.key`, `audit.db` and the audit fallback file.
    pub data_dir: Option<PathBuf>,
    /// Holds the key files. Defaults to `<data_dir>/keys`.
    pub key_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    pub encryption_key_env: String,
    pub license_secret_env: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            encryption_key_env: SecretKind::EncryptionKey.default_env_var().to_string(),
            license_secret_env: SecretKind::LicenseSigning.default_env_var().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub salt: String,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            salt: DEFAULT_HARDWARE_SALT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub inactivity_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 8 * 60 * 60,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub channel_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitiesConfig {
    /// Collaborators the operator has switched off; they are refused at
    /// registration.
    pub disabled: BTreeSet<Capability>,
}

/// The complete trust core configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub paths: PathsConfig,
    pub secrets: SecretsConfig,
    pub hardware: HardwareConfig,
    pub password: PasswordPolicy,
    pub hashing: HashingParams,
    pub login: ThrottleConfig,
    pub session: SessionConfig,
    pub service: ServiceConfig,
    pub capabilities: CapabilitiesConfig,
}

impl CoreConfig {
    /// Loads `config.toml` from the default data directory.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(default_data_dir().join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from `path`, or defaults if it does not exist.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config file at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config = Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that would weaken or disable a control.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.password.min_length == 0 || self.password.min_length > self.password.max_length {
            return invalid("password.min_length must be between 1 and password.max_length");
        }
        if self.password.min_character_classes > 4 {
            return invalid("password.min_character_classes must be at most 4");
        }
        if self.login.max_failures == 0 || self.login.window_secs == 0 {
            return invalid("login.max_failures and login.window_secs must be positive");
        }
        if self.login.window_secs > MAX_WINDOW_SECS {
            return Err(ConfigError::Invalid(format!(
                "login.window_secs must be at most {MAX_WINDOW_SECS}"
            )));
        }
        if self.session.inactivity_timeout_secs == 0 {
            return invalid("session.inactivity_timeout_secs must be positive");
        }
        if self.session.inactivity_timeout_secs > MAX_INACTIVITY_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "session.inactivity_timeout_secs must be at most {MAX_INACTIVITY_TIMEOUT_SECS}"
            )));
        }
        if self.service.channel_capacity == 0 {
            return invalid("service.channel_capacity must be positive");
        }
        if self.secrets.encryption_key_env.trim().is_empty()
            || self.secrets.license_secret_env.trim().is_empty()
        {
            return invalid("secret environment variable names must not be empty");
        }
        Ok(())
    }

    /// Returns the configured data directory, or `~/.krats`.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(default_data_dir)
    }

    /// Returns the configured key directory, or `<data_dir>/keys`.
    #[must_use]
    pub fn key_dir(&self) -> PathBuf {
        self.paths
            .key_dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| self.data_dir().join("keys"))
    }

    #[must_use]
    pub fn license_path(&self) -> PathBuf {
        self.data_dir().join(LICENSE_FILE_NAME)
    }

    #[must_use]
    pub fn audit_db_path(&self) -> PathBuf {
        self.data_dir().join(AUDIT_DB_FILE_NAME)
    }

    /// Returns the environment variable consulted for `kind`.
    #[must_use]
    pub fn env_var(&self, kind: SecretKind) -> &str {
        match kind {
            SecretKind::EncryptionKey => &self.secrets.encryption_key_env,
            SecretKind::LicenseSigning => &self.secrets.license_secret_env,
        }
    }

    /// Returns the settings the security manager is built from.
    #[must_use]
    pub fn auth(&self) -> AuthConfig {
        AuthConfig {
            password: self.password.clone(),
            hashing: self.hashing,
            login: self.login,
        }
    }
}

/// `~/.krats`, or `./.krats` when no home directory is known.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DIR_NAME)
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        Err(_) => path.to_path_buf(),
    }
}
