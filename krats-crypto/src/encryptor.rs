//! Abstract encryption interface for the data-access layer.
//!
//! Repositories holding PII columns depend on `Arc<dyn FieldEncryptor>`;
//! they never see raw keys. `EncryptionManager` is the production
//! implementation.

use crate::error::EncryptionResult;
use crate::field::{EncryptedField, EncryptionManager};

/// Encrypts and decrypts individual PII column values.
pub trait FieldEncryptor: Send + Sync {
    /// Encrypts one column value before it is written.
    fn encrypt_field(&self, plaintext: &str) -> EncryptionResult<EncryptedField>;

    /// Decrypts one column value after it is read.
    fn decrypt_field(&self, field: &EncryptedField) -> EncryptionResult<String>;
}

impl FieldEncryptor for EncryptionManager {
    fn encrypt_field(&self, plaintext: &str) -> EncryptionResult<EncryptedField> {
        self.encrypt(plaintext)
    }

    fn decrypt_field(&self, field: &EncryptedField) -> EncryptionResult<String> {
        self.decrypt(field)
    }
}
