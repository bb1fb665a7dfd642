//! Argon2id password hashing.
//!
//! Hashes are PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`)
//! carrying their own salt and cost, so verification needs no external
//! state and old hashes stay verifiable after the configured cost changes.

use crate::error::{AuthError, AuthResult};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Length of the random per-hash salt.
pub const SALT_LEN: usize = 16;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingParams {
    /// Memory cost in KiB.
    pub memory_cost_kib: u32,
    /// Number of passes.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for HashingParams {
    /// OWASP's Argon2id baseline: 19 MiB, 2 passes, 1 lane.
    fn default() -> Self {
        Self {
            memory_cost_kib: 19 * 1024,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl HashingParams {
    fn to_argon2(self) -> AuthResult<Params> {
        Params::new(self.memory_cost_kib, self.time_cost, self.parallelism, None)
            .map_err(|e| AuthError::Hashing(format!("invalid Argon2 params: {e}")))
    }
}

/// Hashes and verifies passwords with fixed Argon2id parameters.
#[derive(Clone)]
pub struct PasswordHashing {
    params: HashingParams,
    argon2: Argon2<'static>,
}

impl std::fmt::Debug for PasswordHashing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHashing")
            .field("params", &self.params)
            .finish()
    }
}

impl PasswordHashing {
    /// Creates a hasher, validating `params`.
    pub fn new(params: HashingParams) -> AuthResult<Self> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);
        Ok(Self { params, argon2 })
    }

    /// Returns the configured parameters.
    #[must_use]
    pub fn params(&self) -> HashingParams {
        self.params
    }

    /// Hashes `password` with a fresh random salt.
    pub fn hash(&self, password: &str) -> AuthResult<String> {
        let mut salt_bytes = [0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AuthError::Hashing(e.to_string()))?;

        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Returns true if `password` matches `hash`.
    ///
    /// The digest comparison is constant-time. A malformed `hash` never
    /// matches.
    #[must_use]
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Returns true if `hash` was produced with other parameters or another
    /// algorithm and should be replaced after the next successful login.
    #[must_use]
    pub fn needs_rehash(&self, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return true;
        };
        if parsed.algorithm != Algorithm::Argon2id.ident() {
            return true;
        }
        match Params::try_from(&parsed) {
            Ok(stored) => {
                stored.m_cost() != self.params.memory_cost_kib
                    || stored.t_cost() != self.params.time_cost
                    || stored.p_cost() != self.params.parallelism
            }
            Err(_) => true,
        }
    }
}
