//! Text field encryption for PII columns.

use crate::cipher::{self, EncryptedData};
use crate::error::{EncryptionError, EncryptionResult};
use crate::key::{FieldKey, SecretKind};
use crate::keystore::KeyStore;
use krats_types::{AuditAction, AuditEntry, AuditOutcome, AuditSink};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Largest plaintext accepted by [`EncryptionManager::encrypt`].
pub const MAX_FIELD_LEN: usize = 16 * 1024 * 1024;

/// An encrypted column value, stored as an opaque token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedField(String);

impl EncryptedField {
    /// Wraps a token read back from storage. Not validated until decrypted.
    #[must_use]
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token text to store.
    #[must_use]
    pub fn as_token(&self) -> &str {
        &self.0
    }

    /// Consumes the field, returning the token text.
    #[must_use]
    pub fn into_token(self) -> String {
        self.0
    }
}

impl fmt::Debug for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedField({} chars)", self.0.len())
    }
}

impl fmt::Display for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encrypts and decrypts text fields under the store's encryption key.
///
/// The key is resolved once at construction and held for the manager's
/// lifetime. All operations take `&self` and are safe to call from any
/// number of threads.
pub struct EncryptionManager {
    key: FieldKey,
    audit: Option<Arc<dyn AuditSink>>,
}

impl EncryptionManager {
    /// Resolves the encryption key from `store`.
    ///
    /// # Errors
    ///
    /// Returns [`EncryptionError::KeyUnavailable`] if no key can be resolved.
    pub fn new(store: &KeyStore) -> EncryptionResult<Self> {
        let material = store.resolve(SecretKind::EncryptionKey)?;
        let key = FieldKey::from_material(&material)?;
        Ok(Self::from_key(key))
    }

    /// Creates a manager over an explicit key.
    #[must_use]
    pub fn from_key(key: FieldKey) -> Self {
        Self { key, audit: None }
    }

    /// Records decryption failures to `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Encrypts `plaintext`. Two calls on the same input yield different tokens.
    pub fn encrypt(&self, plaintext: &str) -> EncryptionResult<EncryptedField> {
        if plaintext.len() > MAX_FIELD_LEN {
            return Err(EncryptionError::PlaintextTooLarge {
                len: plaintext.len(),
                max: MAX_FIELD_LEN,
            });
        }
        let encrypted = cipher::encrypt(&self.key, plaintext.as_bytes())?;
        Ok(EncryptedField(encrypted.to_token()))
    }

    /// Decrypts a field produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, field: &EncryptedField) -> EncryptionResult<String> {
        self.decrypt_token(field.as_token())
    }

    /// Decrypts a raw token string.
    pub fn decrypt_token(&self, token: &str) -> EncryptionResult<String> {
        let result = EncryptedData::from_token(token)
            .and_then(|data| cipher::decrypt(&self.key, &data))
            .and_then(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|e| EncryptionError::InvalidToken(format!("invalid UTF-8: {e}")))
            });
        if let Err(e) = &result {
            self.audit_failure(e);
        }
        result
    }

    /// Encrypts an optional column; `None` stays `None`.
    pub fn encrypt_optional(
        &self,
        plaintext: Option<&str>,
    ) -> EncryptionResult<Option<EncryptedField>> {
        plaintext.map(|p| self.encrypt(p)).transpose()
    }

    /// Decrypts an optional column; `None` stays `None`.
    pub fn decrypt_optional(
        &self,
        field: Option<&EncryptedField>,
    ) -> EncryptionResult<Option<String>> {
        field.map(|f| self.decrypt(f)).transpose()
    }

    fn audit_failure(&self, err: &EncryptionError) {
        warn!("Field decryption failed: {}", err);
        let Some(sink) = &self.audit else { return };
        let target = match err {
            EncryptionError::InvalidToken(_) => "invalid-token",
            _ => "authentication",
        };
        let entry = AuditEntry::system(AuditAction::DecryptFailed, target, AuditOutcome::Failure);
        if let Err(e) = sink.record(entry) {
            warn!("Failed to audit decryption failure: {}", e);
        }
    }
}

impl fmt::Debug for EncryptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionManager")
            .field("key", &self.key)
            .field("audited", &self.audit.is_some())
            .finish()
    }
}
