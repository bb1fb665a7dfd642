//! License records and the license key format.
//!
//! License keys use the format: `base64url(payload).base64url(signature)`
//!
//! The payload is a JSON object containing:
//! - `license_id`: UUID v7 of the issued license
//! - `licensee`: the licensed practice or company
//! - `seat_limit`: maximum user accounts, absent for unlimited
//! - `hardware_id`: the machine the license is bound to
//! - `issued_at` / `expires_at`: RFC 3339 timestamps, `expires_at` absent
//!   for a perpetual license
//!
//! The signature is HMAC-SHA256 over `payload_b64.as_bytes()` (the
//! base64url-encoded payload string, not the decoded JSON), so verification
//! never depends on how JSON is re-serialized.

use crate::device::HardwareId;
use crate::error::{LicenseError, LicenseResult};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use krats_types::LicenseId;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Length of an HMAC-SHA256 signature.
pub const SIGNATURE_LEN: usize = 32;

/// The signed contents of a license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensePayload {
    pub license_id: LicenseId,
    pub licensee: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat_limit: Option<u32>,
    pub hardware_id: HardwareId,
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// A parsed license key. Parsing checks structure only; call
/// [`verify`](Self::verify) before trusting any field.
#[derive(Clone, PartialEq, Eq)]
pub struct LicenseRecord {
    payload: LicensePayload,
    payload_b64: String,
    signature: Vec<u8>,
}

impl LicenseRecord {
    /// Signs `payload` with `secret`.
    pub fn sign(payload: LicensePayload, secret: &[u8]) -> LicenseResult<Self> {
        let json = serde_json::to_vec(&payload)?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(json);
        let signature = compute_hmac(secret, payload_b64.as_bytes())?;
        Ok(Self {
            payload,
            payload_b64,
            signature,
        })
    }

    /// Parses a license key string.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidKeyFormat`] if the key is not two
    /// base64url parts or the payload is not a license payload.
    pub fn parse(key: &str) -> LicenseResult<Self> {
        let key = key.trim();

        let Some((payload_b64, signature_b64)) = key.split_once('.') else {
            return Err(LicenseError::InvalidKeyFormat(
                "key must have exactly two parts separated by a dot".to_string(),
            ));
        };
        if signature_b64.contains('.') {
            return Err(LicenseError::InvalidKeyFormat(
                "key must have exactly two parts separated by a dot".to_string(),
            ));
        }

        let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|e| {
            LicenseError::InvalidKeyFormat(format!("invalid signature base64: {e}"))
        })?;
        if signature.len() != SIGNATURE_LEN {
            return Err(LicenseError::InvalidKeyFormat(
                "invalid signature length".to_string(),
            ));
        }

        let payload_json = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|e| {
            LicenseError::InvalidKeyFormat(format!("invalid payload base64: {e}"))
        })?;
        let payload: LicensePayload = serde_json::from_slice(&payload_json)
            .map_err(|e| LicenseError::InvalidKeyFormat(format!("invalid payload JSON: {e}")))?;

        Ok(Self {
            payload,
            payload_b64: payload_b64.to_string(),
            signature,
        })
    }

    /// Returns true if the signature verifies against `secret`.
    /// The comparison is constant-time.
    #[must_use]
    pub fn verify(&self, secret: &[u8]) -> bool {
        match compute_hmac(secret, self.payload_b64.as_bytes()) {
            Ok(expected) => expected.ct_eq(self.signature.as_slice()).into(),
            Err(_) => false,
        }
    }

    /// Encodes the record as a license key string.
    #[must_use]
    pub fn to_key_string(&self) -> String {
        format!(
            "{}.{}",
            self.payload_b64,
            URL_SAFE_NO_PAD.encode(&self.signature)
        )
    }

    /// Returns the decoded payload.
    #[must_use]
    pub fn payload(&self) -> &LicensePayload {
        &self.payload
    }

    #[must_use]
    pub fn license_id(&self) -> LicenseId {
        self.payload.license_id
    }

    /// Returns the short identifier safe to log.
    #[must_use]
    pub fn redacted_id(&self) -> String {
        self.payload.license_id.redacted()
    }

    #[must_use]
    pub fn licensee(&self) -> &str {
        &self.payload.licensee
    }

    #[must_use]
    pub fn seat_limit(&self) -> Option<u32> {
        self.payload.seat_limit
    }

    #[must_use]
    pub fn hardware_id(&self) -> &HardwareId {
        &self.payload.hardware_id
    }

    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.payload.issued_at
    }

    /// Returns the expiry, or `None` for a perpetual license.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.payload.expires_at
    }

    /// Returns true if the license has an expiry at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.payload.expires_at.is_some_and(|exp| exp <= now)
    }
}

impl std::fmt::Debug for LicenseRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseRecord")
            .field("license_id", &self.redacted_id())
            .field("licensee", &self.payload.licensee)
            .field("hardware_id", &self.payload.hardware_id)
            .field("expires_at", &self.payload.expires_at)
            .finish_non_exhaustive()
    }
}

fn compute_hmac(secret: &[u8], payload: &[u8]) -> LicenseResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| LicenseError::Secret(format!("invalid signing secret: {e}")))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}
