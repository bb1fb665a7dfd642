//! Error types for authentication.

use crate::policy::PolicyResult;
use thiserror::Error;

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Recoverable authentication errors, surfaced to the caller for
/// user-facing retry.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user or wrong password. Deliberately does not say which.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// The new password does not satisfy the password policy.
    #[error("password does not meet policy: {0}")]
    WeakPassword(PolicyResult),

    /// Too many recent failures for this username.
    #[error("too many failed attempts; retry in {retry_after_secs} seconds")]
    LockedOut { retry_after_secs: u64 },

    /// The username cannot be used as an audit actor.
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    /// The hasher rejected its parameters or input.
    #[error("password hashing failed: {0}")]
    Hashing(String),
}
