//! Credential hashing, password policy and login throttling for the KRATS
//! trust core.
//!
//! [`SecurityManager`] is the only component that touches passwords. It
//! hashes with Argon2id, enforces the configured [`PasswordPolicy`],
//! throttles repeated failures per username, and emits one audit entry per
//! authentication decision.

pub mod error;
pub mod manager;
pub mod password;
pub mod policy;
pub mod throttle;

pub use error::{AuthError, AuthResult};
pub use manager::{AuthConfig, Credential, SecurityManager};
pub use password::{HashingParams, PasswordHashing};
pub use policy::{PasswordPolicy, PolicyResult, PolicyViolation};
pub use throttle::{Attempt, LoginThrottle, MAX_WINDOW_SECS, ThrottleConfig, normalize_username};
