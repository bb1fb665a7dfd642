//! Error types for the audit trail.

use thiserror::Error;

/// Audit trail errors.
///
/// A failed write never aborts the operation it describes: callers log a
/// warning and carry on. `fallback_persisted` tells them whether the entry
/// still reached the fallback file.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to open audit store: {0}")]
    Open(String),

    #[error("audit write failed (fallback persisted: {fallback_persisted}): {source}")]
    Write {
        #[source]
        source: rusqlite::Error,
        fallback_persisted: bool,
    },

    #[error("audit query failed: {0}")]
    Query(String),
}

impl AuditError {
    /// Returns true if a failed write was saved to the fallback file.
    #[must_use]
    pub fn fallback_persisted(&self) -> bool {
        matches!(
            self,
            Self::Write {
                fallback_persisted: true,
                ..
            }
        )
    }
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
