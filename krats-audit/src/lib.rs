//! Append-only audit trail for the KRATS trust core.
//!
//! Every security-relevant action in the core (logins, password changes,
//! key generation, decrypt failures, license activations) becomes one row
//! in a SQLite table that the application can read but never rewrite:
//! UPDATE and DELETE are rejected by triggers.
//!
//! A row that cannot be written is appended to a JSON-lines fallback file
//! and escalated through an [`AlertSink`]; the caller gets
//! [`AuditError::Write`] and carries on.

mod alert;
mod error;
mod fallback;
mod log;

pub use alert::{AlertSink, AuditAlert, TracingAlertSink};
pub use error::{AuditError, AuditResult};
pub use fallback::{FALLBACK_FILE_NAME, FallbackLog};
pub use log::{AuditLog, StoredEntry};
