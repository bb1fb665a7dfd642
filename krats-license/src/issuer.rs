//! Offline license issuing.
//!
//! Runs on the vendor's machine with the same signing secret the clinic
//! installation resolves from its key store.

use crate::device::HardwareId;
use crate::error::LicenseResult;
use crate::record::{LicensePayload, LicenseRecord};
use chrono::{DateTime, Utc};
use krats_crypto::SecretMaterial;
use krats_types::{Clock, LicenseId, SystemClock};
use std::sync::Arc;
use tracing::info;

/// What to license.
#[derive(Debug, Clone)]
pub struct LicenseRequest {
    pub licensee: String,
    pub hardware_id: HardwareId,
    pub seat_limit: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl LicenseRequest {
    /// A perpetual, unlimited-seat license for `hardware_id`.
    #[must_use]
    pub fn new(licensee: impl Into<String>, hardware_id: HardwareId) -> Self {
        Self {
            licensee: licensee.into(),
            hardware_id,
            seat_limit: None,
            expires_at: None,
        }
    }

    #[must_use]
    pub fn seat_limit(mut self, seats: u32) -> Self {
        self.seat_limit = Some(seats);
        self
    }

    #[must_use]
    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Signs new license records.
pub struct LicenseIssuer {
    secret: Arc<SecretMaterial>,
    clock: Arc<dyn Clock>,
}

impl LicenseIssuer {
    #[must_use]
    pub fn new(secret: Arc<SecretMaterial>) -> Self {
        Self::with_clock(secret, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(secret: Arc<SecretMaterial>, clock: Arc<dyn Clock>) -> Self {
        Self { secret, clock }
    }

    /// Issues a signed license stamped with the current time.
    pub fn issue(&self, request: LicenseRequest) -> LicenseResult<LicenseRecord> {
        let payload = LicensePayload {
            license_id: LicenseId::new(),
            licensee: request.licensee,
            seat_limit: request.seat_limit,
            hardware_id: request.hardware_id,
            issued_at: self.clock.now(),
            expires_at: request.expires_at,
        };
        let record = LicenseRecord::sign(payload, self.secret.as_bytes())?;
        info!(
            "Issued license {} for {}",
            record.redacted_id(),
            record.licensee()
        );
        Ok(record)
    }
}
