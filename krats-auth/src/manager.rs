//! The security manager: the single entry point for credential work.

use crate::error::{AuthError, AuthResult};
use crate::password::{HashingParams, PasswordHashing};
use crate::policy::{PasswordPolicy, PolicyResult, PolicyViolation};
use crate::throttle::{LoginThrottle, ThrottleConfig, normalize_username};
use krats_types::{
    ActorId, AuditAction, AuditEntry, AuditOutcome, AuditSink, Clock, SystemClock,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Authentication configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub password: PasswordPolicy,
    pub hashing: HashingParams,
    pub login: ThrottleConfig,
}

/// A stored credential. `password_hash` embeds its salt and cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password_hash: String,
}

/// Hashes, verifies and polices passwords, throttles logins and audits
/// every authentication decision.
pub struct SecurityManager {
    hashing: PasswordHashing,
    policy: PasswordPolicy,
    throttle: LoginThrottle,
    audit: Option<Arc<dyn AuditSink>>,
    dummy_hash: OnceCell<String>,
}

impl SecurityManager {
    /// Creates a manager on the system clock.
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a manager whose throttle reads time from `clock`.
    pub fn with_clock(config: AuthConfig, clock: Arc<dyn Clock>) -> AuthResult<Self> {
        Ok(Self {
            hashing: PasswordHashing::new(config.hashing)?,
            policy: config.password,
            throttle: LoginThrottle::with_clock(config.login, clock),
            audit: None,
            dummy_hash: OnceCell::new(),
        })
    }

    /// Records authentication events to `sink`.
    #[must_use]
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Returns the active password policy.
    #[must_use]
    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Hashes `password` with a fresh salt.
    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        self.hashing.hash(password)
    }

    /// Returns true if `password` matches `hash`.
    #[must_use]
    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        self.hashing.verify(password, hash)
    }

    /// Returns true if `hash` should be replaced with one at current cost.
    #[must_use]
    pub fn needs_rehash(&self, hash: &str) -> bool {
        self.hashing.needs_rehash(hash)
    }

    /// Checks `password` against the policy.
    #[must_use]
    pub fn check_strength(&self, password: &str) -> PolicyResult {
        self.policy.check(password)
    }

    /// Checks `password` against the policy for the account `username`.
    #[must_use]
    pub fn check_strength_for(&self, username: &str, password: &str) -> PolicyResult {
        self.policy.check_for(Some(username), password)
    }

    /// Creates a credential for a new account after enforcing the policy.
    pub fn create_credential(&self, username: &str, password: &str) -> AuthResult<Credential> {
        let actor = ActorId::new(username).map_err(|e| AuthError::InvalidUsername(e.to_string()))?;
        let result = self.check_strength_for(actor.as_str(), password);
        if !result.is_acceptable() {
            self.audit(actor.clone(), AuditAction::PasswordRejected, AuditOutcome::Denied);
            return Err(AuthError::WeakPassword(result));
        }

        let password_hash = self.hash_password(password)?;
        info!("Created credential for {}", actor);
        self.audit(actor.clone(), AuditAction::UserCreated, AuditOutcome::Success);
        Ok(Credential {
            username: actor.as_str().to_string(),
            password_hash,
        })
    }

    /// Authenticates `username` against `stored`.
    ///
    /// `stored` is `None` when the data layer found no such user; a dummy
    /// verification still runs so the response time does not reveal it.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
        stored: Option<&Credential>,
    ) -> AuthResult<()> {
        let actor = actor_for(username);

        let attempt = match self.throttle.begin_attempt(username) {
            Ok(attempt) => attempt,
            Err(retry_after_secs) => {
                warn!("Login refused for {}: locked for {}s", actor, retry_after_secs);
                self.audit(actor, AuditAction::LoginLocked, AuditOutcome::Denied);
                return Err(AuthError::LockedOut { retry_after_secs });
            }
        };

        let matched = match stored {
            Some(credential)
                if normalize_username(&credential.username) == normalize_username(username) =>
            {
                self.verify_password(password, &credential.password_hash)
            }
            _ => {
                self.dummy_verify(password);
                false
            }
        };

        if matched {
            attempt.succeed();
            debug!("Login succeeded for {}", actor);
            self.audit(actor, AuditAction::Login, AuditOutcome::Success);
            return Ok(());
        }

        let locked = attempt.fail();
        warn!(
            "Login failed for {} ({} attempts left)",
            actor,
            self.throttle.remaining_attempts(username)
        );
        self.audit(actor.clone(), AuditAction::LoginFailed, AuditOutcome::Failure);
        if locked {
            self.audit(actor, AuditAction::LoginLocked, AuditOutcome::Denied);
        }
        Err(AuthError::InvalidCredentials)
    }

    /// Replaces the password of `credential` after verifying the current one.
    pub fn change_password(
        &self,
        credential: &Credential,
        current: &str,
        new: &str,
    ) -> AuthResult<Credential> {
        let actor = actor_for(&credential.username);

        if !self.verify_password(current, &credential.password_hash) {
            self.audit(actor, AuditAction::PasswordChanged, AuditOutcome::Failure);
            return Err(AuthError::InvalidCredentials);
        }

        let mut result = self.check_strength_for(&credential.username, new);
        if current == new {
            result = PolicyResult::from_violations(
                result
                    .violations()
                    .iter()
                    .cloned()
                    .chain(std::iter::once(PolicyViolation::ReusesCurrent))
                    .collect(),
            );
        }
        if !result.is_acceptable() {
            self.audit(actor, AuditAction::PasswordRejected, AuditOutcome::Denied);
            return Err(AuthError::WeakPassword(result));
        }

        let password_hash = self.hash_password(new)?;
        info!("Password changed for {}", actor);
        self.audit(actor, AuditAction::PasswordChanged, AuditOutcome::Success);
        Ok(Credential {
            username: credential.username.clone(),
            password_hash,
        })
    }

    /// Records an explicit logout.
    pub fn record_logout(&self, username: &str) {
        self.audit(actor_for(username), AuditAction::Logout, AuditOutcome::Success);
    }

    fn dummy_verify(&self, password: &str) {
        match self.dummy_hash.get_or_try_init(|| self.hash_password("krats-dummy-credential")) {
            Ok(hash) => {
                let _ = self.verify_password(password, hash);
            }
            Err(e) => warn!("Failed to prepare dummy credential: {}", e),
        }
    }

    fn audit(&self, actor: ActorId, action: AuditAction, outcome: AuditOutcome) {
        let Some(sink) = &self.audit else { return };
        let target = actor.as_str().to_string();
        if let Err(e) = sink.record(AuditEntry::new(actor, action, target, outcome)) {
            warn!("Audit write failed, continuing: {}", e);
        }
    }
}

impl std::fmt::Debug for SecurityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityManager")
            .field("hashing", &self.hashing)
            .field("policy", &self.policy)
            .field("throttle", &self.throttle)
            .finish()
    }
}

/// Usernames that cannot be audit actors (empty, control characters) are
/// attributed to the system actor.
fn actor_for(username: &str) -> ActorId {
    ActorId::new(username).unwrap_or_else(|_| ActorId::system())
}
