//! The license status machine and startup gate.
//!
//! Every check starts from `Unvalidated` and walks the rules in a fixed
//! order: a missing record, then the signature, then the hardware binding,
//! then expiry. Signature verification comes first so a forged record is
//! always reported as `Tampered`, never as merely expired or mismatched.
//! Nothing is cached between checks.

use crate::device::{HardwareFingerprint, HardwareId};
use crate::error::{LicenseError, LicenseResult};
use crate::record::LicenseRecord;
use crate::store::LicenseStore;
use krats_crypto::SecretMaterial;
use krats_types::{AuditAction, AuditEntry, AuditOutcome, AuditSink, Clock, SystemClock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Classification of the stored license. Derived on every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicenseStatus {
    /// Starting state of an evaluation; never the result of one.
    Unvalidated,
    Valid,
    Expired,
    HardwareMismatch,
    Missing,
    Tampered,
}

impl LicenseStatus {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unvalidated => "UNVALIDATED",
            Self::Valid => "VALID",
            Self::Expired => "EXPIRED",
            Self::HardwareMismatch => "HARDWARE_MISMATCH",
            Self::Missing => "MISSING",
            Self::Tampered => "TAMPERED",
        }
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates, activates and reports on the installation's license.
pub struct LicenseManager {
    store: LicenseStore,
    secret: Arc<SecretMaterial>,
    fingerprint: HardwareFingerprint,
    clock: Arc<dyn Clock>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl LicenseManager {
    #[must_use]
    pub fn new(
        store: LicenseStore,
        secret: Arc<SecretMaterial>,
        fingerprint: HardwareFingerprint,
    ) -> Self {
        Self {
            store,
            secret,
            fingerprint,
            clock: Arc::new(SystemClock),
            audit: None,
        }
    }

    /// Reads expiry against `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Records activations to `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Returns this machine's hardware id, freshly computed.
    #[must_use]
    pub fn hardware_id(&self) -> HardwareId {
        self.fingerprint.compute()
    }

    /// Returns the license file location.
    #[must_use]
    pub fn store(&self) -> &LicenseStore {
        &self.store
    }

    /// Classifies the stored license.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Storage`] only if the license file exists but
    /// cannot be read; every license problem is a status, not an error.
    pub fn check(&self) -> LicenseResult<LicenseStatus> {
        let (status, record) = self.classify_stored()?;
        match &record {
            Some(record) => info!("License {} status: {}", record.redacted_id(), status),
            None => info!("License status: {}", status),
        }
        Ok(status)
    }

    /// Checks the stored license and returns it only if valid.
    pub fn require_valid(&self) -> LicenseResult<LicenseRecord> {
        match self.classify_stored()? {
            (LicenseStatus::Valid, Some(record)) => Ok(record),
            (status, _) => {
                warn!("License check failed: {}", status);
                Err(LicenseError::from_status(status).unwrap_or(LicenseError::Missing))
            }
        }
    }

    /// Classifies a license key without storing it.
    #[must_use]
    pub fn evaluate(&self, key: &str) -> LicenseStatus {
        match LicenseRecord::parse(key) {
            Ok(record) => self.classify(&record),
            Err(_) => LicenseStatus::Tampered,
        }
    }

    /// Activates `license_key` if it is valid for this machine right now.
    ///
    /// A key that would not evaluate to `Valid` is never persisted; the
    /// previously stored license, if any, is left untouched.
    pub fn activate(&self, license_key: &str) -> LicenseResult<LicenseRecord> {
        let record = match LicenseRecord::parse(license_key) {
            Ok(record) => record,
            Err(e) => {
                warn!("Rejected license activation: malformed key");
                self.audit_activation("malformed", AuditOutcome::Denied);
                return Err(e);
            }
        };

        let status = self.classify(&record);
        if let Some(err) = LicenseError::from_status(status) {
            warn!(
                "Rejected activation of license {}: {}",
                record.redacted_id(),
                status
            );
            self.audit_activation(&record.redacted_id(), AuditOutcome::Denied);
            return Err(err);
        }

        self.store.save(&record.to_key_string())?;
        info!("Activated license {}", record.redacted_id());
        self.audit_activation(&record.redacted_id(), AuditOutcome::Success);
        Ok(record)
    }

    /// Returns the stored record if its signature verifies, whatever its
    /// expiry or binding.
    pub fn current_record(&self) -> LicenseResult<Option<LicenseRecord>> {
        Ok(self
            .store
            .load()?
            .and_then(|key| LicenseRecord::parse(&key).ok())
            .filter(|record| record.verify(self.secret.as_bytes())))
    }

    /// Returns `Ok` if one more user account fits the licensed seats.
    pub fn check_seat_limit(&self, current_users: u32) -> LicenseResult<()> {
        let record = self.require_valid()?;
        match record.seat_limit() {
            Some(limit) if current_users >= limit => Err(LicenseError::SeatLimitExceeded {
                limit,
                current: current_users,
            }),
            _ => Ok(()),
        }
    }

    fn classify_stored(&self) -> LicenseResult<(LicenseStatus, Option<LicenseRecord>)> {
        let Some(key) = self.store.load()? else {
            return Ok((LicenseStatus::Missing, None));
        };
        match LicenseRecord::parse(&key) {
            Ok(record) => Ok((self.classify(&record), Some(record))),
            Err(_) => Ok((LicenseStatus::Tampered, None)),
        }
    }

    fn classify(&self, record: &LicenseRecord) -> LicenseStatus {
        if !record.verify(self.secret.as_bytes()) {
            LicenseStatus::Tampered
        } else if record.hardware_id() != &self.fingerprint.compute() {
            LicenseStatus::HardwareMismatch
        } else if record.is_expired_at(self.clock.now()) {
            LicenseStatus::Expired
        } else {
            LicenseStatus::Valid
        }
    }

    fn audit_activation(&self, target: &str, outcome: AuditOutcome) {
        let Some(sink) = &self.audit else { return };
        let action = match outcome {
            AuditOutcome::Success => AuditAction::LicenseActivated,
            _ => AuditAction::LicenseRejected,
        };
        if let Err(e) = sink.record(AuditEntry::system(action, target, outcome)) {
            warn!("Audit write failed, continuing: {}", e);
        }
    }
}

impl fmt::Debug for LicenseManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LicenseManager")
            .field("store", &self.store)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}
