//! The trust context and the startup gate.
//!
//! [`TrustContext::bootstrap`] is the only way to obtain the core's
//! components. It runs the license check before anything else is built:
//! until the license verifies, no audit database is opened, no encryption
//! key is resolved and no credential can be checked.

use crate::capability::CapabilityRegistry;
use crate::config::CoreConfig;
use crate::error::StartupResult;
use krats_audit::AuditLog;
use krats_auth::SecurityManager;
use krats_crypto::{EncryptionManager, EnvLookup, KeyStore, SecretKind, SecretSource};
use krats_license::{HardwareFingerprint, LicenseManager, LicenseRecord, LicenseStore};
use krats_types::{AuditAction, AuditEntry, AuditOutcome, AuditSink, Clock};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything the application needs from the trust core, built once at
/// startup and passed explicitly.
pub struct TrustContext {
    config: CoreConfig,
    license_record: LicenseRecord,
    keystore: Arc<KeyStore>,
    license: Arc<LicenseManager>,
    encryption: Arc<EncryptionManager>,
    security: Arc<SecurityManager>,
    audit: Arc<AuditLog>,
    capabilities: Arc<CapabilityRegistry>,
}

/// Startup options beyond the config file. Tests use these to pin the
/// machine identity, secret sources and time.
pub struct Bootstrap {
    config: CoreConfig,
    fingerprint: Option<HardwareFingerprint>,
    env: Option<EnvLookup>,
    clock: Option<Arc<dyn Clock>>,
}

impl Bootstrap {
    /// Uses `fingerprint` instead of the platform identifiers.
    #[must_use]
    pub fn fingerprint(mut self, fingerprint: HardwareFingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Reads named secrets through `env` instead of the process environment.
    #[must_use]
    pub fn env_lookup(mut self, env: EnvLookup) -> Self {
        self.env = Some(env);
        self
    }

    /// Reads license expiry and throttle windows from `clock`.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Runs the license gate, then builds the remaining components.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::License`](crate::StartupError::License) for
    /// any non-valid license status. Other variants report a component
    /// that could not be built after the gate passed.
    pub fn run(self) -> StartupResult<TrustContext> {
        let Self {
            config,
            fingerprint,
            env,
            clock,
        } = self;
        config.validate()?;

        let mut keys = KeyStore::builder(config.key_dir())
            .env_var(
                SecretKind::EncryptionKey,
                config.env_var(SecretKind::EncryptionKey),
            )
            .env_var(
                SecretKind::LicenseSigning,
                config.env_var(SecretKind::LicenseSigning),
            );
        if let Some(env) = env {
            keys = keys.env_lookup(env);
        }
        let keystore = Arc::new(keys.build());

        // License gate.
        let fingerprint =
            fingerprint.unwrap_or_else(|| HardwareFingerprint::system(config.hardware.salt.as_str()));
        let secret = keystore.resolve(SecretKind::LicenseSigning)?;
        let mut license = LicenseManager::new(
            LicenseStore::new(config.license_path()),
            secret,
            fingerprint,
        );
        if let Some(clock) = &clock {
            license = license.with_clock(Arc::clone(clock));
        }
        let license_record = match license.require_valid() {
            Ok(record) => record,
            Err(e) => {
                error!("Startup halted by license check: {}", e);
                return Err(e.into());
            }
        };
        info!(
            "License {} valid for {}",
            license_record.redacted_id(),
            license_record.licensee()
        );

        // Everything below runs only with a valid license.
        let audit = Arc::new(AuditLog::open(config.audit_db_path())?);
        let sink: Arc<dyn AuditSink> = audit.clone();
        record_or_warn(
            sink.as_ref(),
            AuditEntry::system(
                AuditAction::LicenseChecked,
                license_record.redacted_id(),
                AuditOutcome::Success,
            ),
        );
        let license = Arc::new(license.with_audit(Arc::clone(&sink)));

        let encryption =
            Arc::new(EncryptionManager::new(&keystore)?.with_audit(Arc::clone(&sink)));

        for kind in SecretKind::ALL {
            if keystore.source(kind) == Some(SecretSource::Generated) {
                record_or_warn(
                    sink.as_ref(),
                    AuditEntry::system(
                        AuditAction::KeyGenerated,
                        kind.default_file_name(),
                        AuditOutcome::Success,
                    ),
                );
            }
        }

        let security = match &clock {
            Some(clock) => SecurityManager::with_clock(config.auth(), Arc::clone(clock))?,
            None => SecurityManager::new(config.auth())?,
        };
        let security = Arc::new(security.with_audit(Arc::clone(&sink)));

        let capabilities = Arc::new(CapabilityRegistry::with_disabled(
            config.capabilities.disabled.clone(),
        ));

        info!("Trust core ready");
        Ok(TrustContext {
            config,
            license_record,
            keystore,
            license,
            encryption,
            security,
            audit,
            capabilities,
        })
    }
}

impl TrustContext {
    /// Starts the trust core with platform defaults.
    pub fn bootstrap(config: CoreConfig) -> StartupResult<Self> {
        Self::builder(config).run()
    }

    /// Starts building a context with overrides.
    #[must_use]
    pub fn builder(config: CoreConfig) -> Bootstrap {
        Bootstrap {
            config,
            fingerprint: None,
            env: None,
            clock: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The license that passed the startup gate.
    #[must_use]
    pub fn license_record(&self) -> &LicenseRecord {
        &self.license_record
    }

    #[must_use]
    pub fn keystore(&self) -> &Arc<KeyStore> {
        &self.keystore
    }

    #[must_use]
    pub fn license(&self) -> &Arc<LicenseManager> {
        &self.license
    }

    #[must_use]
    pub fn encryption(&self) -> &Arc<EncryptionManager> {
        &self.encryption
    }

    #[must_use]
    pub fn security(&self) -> &Arc<SecurityManager> {
        &self.security
    }

    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// The audit log as the sink collaborators write through.
    #[must_use]
    pub fn audit_sink(&self) -> Arc<dyn AuditSink> {
        self.audit.clone()
    }

    #[must_use]
    pub fn capabilities(&self) -> &Arc<CapabilityRegistry> {
        &self.capabilities
    }
}

impl std::fmt::Debug for TrustContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustContext")
            .field("license", &self.license_record)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

fn record_or_warn(sink: &dyn AuditSink, entry: AuditEntry) {
    if let Err(e) = sink.record(entry) {
        warn!("Audit write failed, continuing: {}", e);
    }
}
