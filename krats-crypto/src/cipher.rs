//! Field encryption using ChaCha20-Poly1305.
//!
//! A token is `base64(version || nonce || ciphertext || tag)`. The nonce is
//! drawn fresh from the OS RNG on every call, so encrypting the same
//! plaintext twice never yields the same token.

use crate::error::{EncryptionError, EncryptionResult};
use crate::key::FieldKey;
use base64::{Engine, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;

/// Current token format version.
pub const TOKEN_VERSION: u8 = 1;

/// Size of nonce in bytes (96 bits for ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Smallest decoded token: version byte, nonce and tag over empty plaintext.
pub const MIN_TOKEN_LEN: usize = 1 + NONCE_SIZE + TAG_SIZE;

/// Decoded token contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedData {
    /// The nonce used for encryption (unique per encryption).
    pub nonce: [u8; NONCE_SIZE],
    /// The encrypted ciphertext (includes auth tag).
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Returns the decoded token size, version byte included.
    pub fn len(&self) -> usize {
        1 + NONCE_SIZE + self.ciphertext.len()
    }

    /// Returns true if the ciphertext is empty.
    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    /// Encodes to the storage token.
    pub fn to_token(&self) -> String {
        let mut bytes = Vec::with_capacity(self.len());
        bytes.push(TOKEN_VERSION);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        STANDARD.encode(&bytes)
    }

    /// Decodes a storage token, checking encoding, version and length.
    pub fn from_token(token: &str) -> EncryptionResult<Self> {
        let bytes = STANDARD
            .decode(token.trim())
            .map_err(|e| EncryptionError::InvalidToken(format!("invalid base64: {e}")))?;

        if bytes.len() < MIN_TOKEN_LEN {
            return Err(EncryptionError::InvalidToken(format!(
                "token too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != TOKEN_VERSION {
            return Err(EncryptionError::InvalidToken(format!(
                "unsupported token version {}",
                bytes[0]
            )));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[1..=NONCE_SIZE]);
        let ciphertext = bytes[1 + NONCE_SIZE..].to_vec();

        Ok(Self { nonce, ciphertext })
    }
}

/// Encrypts plaintext under `key` with a fresh random nonce.
pub fn encrypt(key: &FieldKey, plaintext: &[u8]) -> EncryptionResult<EncryptedData> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| EncryptionError::Encryption(e.to_string()))?;

    Ok(EncryptedData {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypts and authenticates `encrypted` under `key`.
///
/// Any authentication failure (wrong key, any modified byte) is
/// [`EncryptionError::DecryptFailure`]; no partial plaintext is returned.
pub fn decrypt(key: &FieldKey, encrypted: &EncryptedData) -> EncryptionResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let nonce = Nonce::from_slice(&encrypted.nonce);

    cipher
        .decrypt(nonce, encrypted.ciphertext.as_ref())
        .map_err(|_| EncryptionError::DecryptFailure)
}
