//! Key management and field-level encryption for the KRATS trust core.
//!
//! This crate provides:
//! - [`KeyStore`]: resolve-once secret material from injected values,
//!   environment variables, key files or fresh generation
//! - [`EncryptionManager`]: authenticated, non-deterministic encryption of
//!   text fields (ChaCha20-Poly1305)
//! - [`FieldEncryptor`]: the interface the data-access layer encrypts through
//!
//! # Security Model
//!
//! The encryption key must be byte-identical across restarts or every
//! stored PII field becomes unreadable. The key store therefore never
//! overwrites an existing key file and fails loudly when a generated key
//! cannot be persisted.

pub mod cipher;
pub mod encryptor;
pub mod error;
pub mod field;
pub mod key;
pub mod keystore;

pub use cipher::{EncryptedData, NONCE_SIZE, TAG_SIZE, TOKEN_VERSION, decrypt, encrypt};
pub use encryptor::FieldEncryptor;
pub use error::{CryptoError, CryptoResult, EncryptionError, EncryptionResult};
pub use field::{EncryptedField, EncryptionManager, MAX_FIELD_LEN};
pub use key::{FieldKey, KEY_SIZE, SecretKind, SecretMaterial};
pub use keystore::{EnvLookup, KeyStore, KeyStoreBuilder, SecretSource};
