//! Secret material and the field encryption key.

use crate::error::{CryptoError, CryptoResult};
use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the field encryption key in bytes (256 bits for ChaCha20).
pub const KEY_SIZE: usize = 32;

/// Minimum accepted length of a license signing secret.
pub const MIN_SIGNING_SECRET_LEN: usize = 16;

/// The kinds of long-lived secret the key store manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretKind {
    /// Symmetric key for PII field encryption.
    EncryptionKey,
    /// HMAC secret license records are signed with.
    LicenseSigning,
}

impl SecretKind {
    /// All kinds, in resolution order used at startup.
    pub const ALL: [SecretKind; 2] = [SecretKind::LicenseSigning, SecretKind::EncryptionKey];

    /// Default environment variable consulted for this kind.
    #[must_use]
    pub fn default_env_var(&self) -> &'static str {
        match self {
            Self::EncryptionKey => "KRATS_ENCRYPTION_KEY",
            Self::LicenseSigning => "KRATS_LICENSE_SECRET",
        }
    }

    /// Default key file name inside the key directory.
    #[must_use]
    pub fn default_file_name(&self) -> &'static str {
        match self {
            Self::EncryptionKey => "secret.key",
            Self::LicenseSigning => "license_secret.key",
        }
    }

    /// Number of bytes generated when no material exists yet, or `None`
    /// if this kind must be provisioned by the installer.
    ///
    /// The signing secret is shared with the offline issuer; one generated
    /// locally could never verify a license.
    #[must_use]
    pub fn generated_len(&self) -> Option<usize> {
        match self {
            Self::EncryptionKey => Some(KEY_SIZE),
            Self::LicenseSigning => None,
        }
    }

    /// Checks that `bytes` is acceptable material for this kind.
    pub fn validate(&self, bytes: &[u8], source_name: &str) -> CryptoResult<()> {
        let reason = match self {
            Self::EncryptionKey if bytes.len() != KEY_SIZE => Some(format!(
                "expected {KEY_SIZE} bytes, got {}",
                bytes.len()
            )),
            Self::LicenseSigning if bytes.len() < MIN_SIGNING_SECRET_LEN => Some(format!(
                "expected at least {MIN_SIGNING_SECRET_LEN} bytes, got {}",
                bytes.len()
            )),
            _ if bytes.iter().all(|b| *b == 0) => Some("material is all zero bytes".to_string()),
            _ => None,
        };
        match reason {
            Some(reason) => Err(CryptoError::InvalidKeyMaterial {
                kind: *self,
                source_name: source_name.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EncryptionKey => "encryption key",
            Self::LicenseSigning => "license signing secret",
        })
    }
}

/// Opaque secret bytes, zeroized on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretMaterial {
    bytes: Vec<u8>,
}

impl SecretMaterial {
    /// Wraps raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Generates `len` bytes from the OS CSPRNG.
    #[must_use]
    pub fn generate(len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Decodes base64 text (standard or URL-safe alphabet).
    pub fn from_base64(kind: SecretKind, encoded: &str, source_name: &str) -> CryptoResult<Self> {
        let encoded = encoded.trim();
        let bytes = STANDARD
            .decode(encoded)
            .or_else(|_| URL_SAFE.decode(encoded))
            .map_err(|e| CryptoError::InvalidKeyMaterial {
                kind,
                source_name: source_name.to_string(),
                reason: format!("invalid base64: {e}"),
            })?;
        kind.validate(&bytes, source_name)?;
        Ok(Self { bytes })
    }

    /// Encodes the material as standard base64 for persistence.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Returns the secret bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the material holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The 256-bit key used for field encryption.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FieldKey {
    bytes: [u8; KEY_SIZE],
}

impl FieldKey {
    /// Creates a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Builds the key from resolved secret material.
    pub fn from_material(material: &SecretMaterial) -> CryptoResult<Self> {
        SecretKind::EncryptionKey.validate(material.as_bytes(), "resolved material")?;
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(material.as_bytes());
        Ok(Self { bytes })
    }

    /// Generates a random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Returns the key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
