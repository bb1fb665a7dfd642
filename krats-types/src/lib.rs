//! Core type definitions for the KRATS trust core.
//!
//! This crate defines the small set of types shared by every component of
//! the trust core:
//! - Actor and license identifiers
//! - Monotonic audit timestamps (hybrid logical clock)
//! - Audit entries and the `AuditSink` seam every component writes through
//! - A `Clock` abstraction so expiry logic can be tested deterministically
//!
//! Component-specific types (keys, license records, password hashes) live in
//! their own crates.

mod audit;
mod clock;
mod ids;
mod timestamp;

pub use audit::{
    AuditAction, AuditEntry, AuditOutcome, AuditSink, AuditWriteError, MemoryAuditSink,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use ids::{ActorId, LicenseId};
pub use timestamp::AuditTimestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid actor id: {0}")]
    InvalidActor(String),

    #[error("unknown audit action: {0}")]
    UnknownAction(String),

    #[error("unknown audit outcome: {0}")]
    UnknownOutcome(String),
}
