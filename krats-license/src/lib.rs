//! Hardware-bound licensing for the KRATS trust core.
//!
//! This module handles:
//! - Hardware fingerprinting for machine binding
//! - License key signing (offline issuer) and HMAC-SHA256 verification
//! - The license status machine that gates application startup
//! - Atomic persistence of the activated license
//!
//! # Design Principles
//!
//! - **Re-validated every start**: no "was valid last time" shortcut
//! - **Signature first**: a forged record is always `TAMPERED`
//! - **Never persist an invalid key**: `activate` stores only keys that
//!   evaluate to `VALID` on this machine
//! - **No raw keys in logs**: only the status and a redacted license id
//!
//! # License Key Format
//!
//! Keys are formatted as: `base64url(payload).base64url(signature)`.
//! See [`record`] for the payload fields.

mod device;
mod error;
mod issuer;
mod manager;
pub mod record;
mod store;

pub use device::{
    DEFAULT_HARDWARE_SALT, FingerprintReport, HardwareFingerprint, HardwareId, HostnameSource,
    IdentifierSource, MacAddressSource, MachineIdSource, PlatformSerialSource, ProductUuidSource,
    Stability, StaticSource,
};
pub use error::{LicenseError, LicenseResult};
pub use issuer::{LicenseIssuer, LicenseRequest};
pub use manager::{LicenseManager, LicenseStatus};
pub use record::{LicensePayload, LicenseRecord};
pub use store::{LICENSE_FILE_NAME, LicenseStore};
