//! Resolution and caching of long-lived secret material.
//!
//! Each [`SecretKind`] is resolved at most once per `KeyStore`, from the
//! first source that has it:
//!
//! 1. material injected through [`KeyStoreBuilder::with_material`]
//! 2. the kind's environment variable (base64)
//! 3. the kind's key file in the key directory (base64 text)
//! 4. fresh CSPRNG output, persisted to the key file before it is returned
//!    (encryption key only; the license signing secret must be provisioned)
//!
//! Concurrent first access blocks on a single initializer, so two threads
//! can never generate two different keys. A key that cannot be persisted is
//! an error: data encrypted under an unpersisted key is lost at restart.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{SecretKind, SecretMaterial};
use krats_types::{AuditAction, AuditEntry, AuditOutcome, AuditSink};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lookup function for environment-style named secrets.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Where a secret was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    Injected,
    Environment,
    KeyFile,
    Generated,
}

struct Resolved {
    material: Arc<SecretMaterial>,
    source: SecretSource,
}

/// Builder for [`KeyStore`].
pub struct KeyStoreBuilder {
    key_dir: PathBuf,
    env_names: HashMap<SecretKind, String>,
    injected: HashMap<SecretKind, SecretMaterial>,
    env: EnvLookup,
    audit: Option<Arc<dyn AuditSink>>,
}

impl KeyStoreBuilder {
    /// Supplies material directly, taking precedence over every other source.
    #[must_use]
    pub fn with_material(mut self, kind: SecretKind, material: SecretMaterial) -> Self {
        self.injected.insert(kind, material);
        self
    }

    /// Overrides the environment variable name consulted for `kind`.
    #[must_use]
    pub fn env_var(mut self, kind: SecretKind, name: impl Into<String>) -> Self {
        self.env_names.insert(kind, name.into());
        self
    }

    /// Replaces the environment lookup (the process environment by default).
    #[must_use]
    pub fn env_lookup(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Records key generation events to `sink`.
    #[must_use]
    pub fn audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Builds the key store. Nothing is resolved until first use.
    #[must_use]
    pub fn build(self) -> KeyStore {
        KeyStore {
            key_dir: self.key_dir,
            env_names: self.env_names,
            injected: self.injected,
            env: self.env,
            audit: self.audit,
            encryption_key: OnceCell::new(),
            license_signing: OnceCell::new(),
        }
    }
}

/// Resolves and caches secret material.
pub struct KeyStore {
    key_dir: PathBuf,
    env_names: HashMap<SecretKind, String>,
    injected: HashMap<SecretKind, SecretMaterial>,
    env: EnvLookup,
    audit: Option<Arc<dyn AuditSink>>,
    encryption_key: OnceCell<Resolved>,
    license_signing: OnceCell<Resolved>,
}

impl KeyStore {
    /// Starts building a key store that keeps its key files in `key_dir`.
    #[must_use]
    pub fn builder(key_dir: impl Into<PathBuf>) -> KeyStoreBuilder {
        KeyStoreBuilder {
            key_dir: key_dir.into(),
            env_names: HashMap::new(),
            injected: HashMap::new(),
            env: Arc::new(|name| std::env::var(name).ok()),
            audit: None,
        }
    }

    /// Resolves `kind`, caching the result for the life of this store.
    ///
    /// # Errors
    ///
    /// Returns an error if a source holds malformed material, if the key
    /// file cannot be read, if generated material cannot be persisted, or
    /// if the license signing secret has not been provisioned.
    pub fn resolve(&self, kind: SecretKind) -> CryptoResult<Arc<SecretMaterial>> {
        self.cell(kind)
            .get_or_try_init(|| self.load(kind))
            .map(|resolved| Arc::clone(&resolved.material))
    }

    /// Returns where `kind` was resolved from, if it has been resolved.
    #[must_use]
    pub fn source(&self, kind: SecretKind) -> Option<SecretSource> {
        self.cell(kind).get().map(|resolved| resolved.source)
    }

    /// Returns the key file path for `kind`.
    #[must_use]
    pub fn key_path(&self, kind: SecretKind) -> PathBuf {
        self.key_dir.join(kind.default_file_name())
    }

    /// Returns the environment variable name consulted for `kind`.
    #[must_use]
    pub fn env_var_name(&self, kind: SecretKind) -> &str {
        self.env_names
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_env_var())
    }

    fn cell(&self, kind: SecretKind) -> &OnceCell<Resolved> {
        match kind {
            SecretKind::EncryptionKey => &self.encryption_key,
            SecretKind::LicenseSigning => &self.license_signing,
        }
    }

    fn load(&self, kind: SecretKind) -> CryptoResult<Resolved> {
        if let Some(material) = self.injected.get(&kind) {
            kind.validate(material.as_bytes(), "injected material")?;
            debug!("Using injected {}", kind);
            return Ok(Resolved {
                material: Arc::new(material.clone()),
                source: SecretSource::Injected,
            });
        }

        let var = self.env_var_name(kind);
        if let Some(value) = (self.env)(var).filter(|v| !v.trim().is_empty()) {
            let material = SecretMaterial::from_base64(kind, &value, var)?;
            info!("Resolved {} from environment variable {}", kind, var);
            return Ok(Resolved {
                material: Arc::new(material),
                source: SecretSource::Environment,
            });
        }

        let path = self.key_path(kind);
        if let Some(material) = read_key_file(kind, &path)? {
            info!("Resolved {} from {:?}", kind, path);
            return Ok(Resolved {
                material: Arc::new(material),
                source: SecretSource::KeyFile,
            });
        }

        let Some(len) = kind.generated_len() else {
            return Err(CryptoError::KeyUnavailable {
                kind,
                reason: format!(
                    "not provisioned; set {var} or create {}",
                    path.display()
                ),
            });
        };
        warn!("No {} found; generating new material at {:?}", kind, path);
        let generated = SecretMaterial::generate(len);
        match persist_new_key(&self.key_dir, &path, &generated) {
            Ok(()) => {}
            Err(PersistError::AlreadyExists) => {
                // Another process created the file first; adopt its key.
                let material = read_key_file(kind, &path)?.ok_or_else(|| {
                    CryptoError::KeyUnavailable {
                        kind,
                        reason: format!(
                            "key file {} vanished after concurrent creation",
                            path.display()
                        ),
                    }
                })?;
                info!("Adopted {} created concurrently at {:?}", kind, path);
                return Ok(Resolved {
                    material: Arc::new(material),
                    source: SecretSource::KeyFile,
                });
            }
            Err(PersistError::Io(e)) => {
                return Err(CryptoError::KeyUnavailable {
                    kind,
                    reason: format!("failed to persist generated key to {}: {e}", path.display()),
                });
            }
        }
        self.audit_generated(kind);

        Ok(Resolved {
            material: Arc::new(generated),
            source: SecretSource::Generated,
        })
    }

    fn audit_generated(&self, kind: SecretKind) {
        let Some(sink) = &self.audit else { return };
        let entry = AuditEntry::system(
            AuditAction::KeyGenerated,
            kind.default_file_name(),
            AuditOutcome::Success,
        );
        if let Err(e) = sink.record(entry) {
            warn!("Failed to audit generation of {}: {}", kind, e);
        }
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("key_dir", &self.key_dir)
            .field("encryption_key", &self.source(SecretKind::EncryptionKey))
            .field("license_signing", &self.source(SecretKind::LicenseSigning))
            .finish()
    }
}

fn read_key_file(kind: SecretKind, path: &Path) -> CryptoResult<Option<SecretMaterial>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CryptoError::KeyUnavailable {
                kind,
                reason: format!("failed to read {}: {e}", path.display()),
            });
        }
    };
    warn_if_readable_by_others(path);
    SecretMaterial::from_base64(kind, &contents, &path.display().to_string()).map(Some)
}

#[cfg(unix)]
fn warn_if_readable_by_others(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(path) {
        if meta.permissions().mode() & 0o077 != 0 {
            warn!("Key file {:?} is accessible to other accounts", path);
        }
    }
}

#[cfg(not(unix))]
fn warn_if_readable_by_others(_path: &Path) {}

enum PersistError {
    AlreadyExists,
    Io(std::io::Error),
}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Writes `material` to `path` via a synced temp file, never replacing an
/// existing file.
fn persist_new_key(dir: &Path, path: &Path, material: &SecretMaterial) -> Result<(), PersistError> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    temp.write_all(material.to_base64().as_bytes())?;
    temp.as_file().sync_all()?;

    match temp.persist_noclobber(path) {
        Ok(_) => Ok(()),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Err(PersistError::AlreadyExists),
        Err(e) => Err(PersistError::Io(e.error)),
    }
}
