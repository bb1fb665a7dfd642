//! Error types for the key store and encryption layer.

use crate::key::SecretKind;
use thiserror::Error;

/// Result type for key store operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Result type for field encryption operations.
pub type EncryptionResult<T> = Result<T, EncryptionError>;

/// Errors raised while resolving secret material.
///
/// Any of these at startup is fatal: nothing protected can be read or
/// written without the key.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No usable material could be resolved or persisted.
    #[error("{kind} unavailable: {reason}")]
    KeyUnavailable { kind: SecretKind, reason: String },

    /// Material was found but is malformed (bad encoding or length).
    #[error("invalid {kind} material from {source_name}: {reason}")]
    InvalidKeyMaterial {
        kind: SecretKind,
        source_name: String,
        reason: String,
    },
}

/// Errors raised by field encryption and decryption.
///
/// Never converted to an empty or default value by this crate.
#[derive(Debug, Error)]
pub enum EncryptionError {
    /// The encryption key could not be resolved.
    #[error("encryption key unavailable: {0}")]
    KeyUnavailable(String),

    /// The token is structurally invalid (encoding, version, length).
    #[error("invalid encrypted token: {0}")]
    InvalidToken(String),

    /// Authentication failed: wrong key or tampered ciphertext.
    #[error("decryption failed (wrong key or tampered data)")]
    DecryptFailure,

    /// The cipher refused to encrypt.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Plaintext exceeds the supported field size.
    #[error("plaintext of {len} bytes exceeds the {max} byte field limit")]
    PlaintextTooLarge { len: usize, max: usize },
}

impl From<CryptoError> for EncryptionError {
    fn from(err: CryptoError) -> Self {
        Self::KeyUnavailable(err.to_string())
    }
}
