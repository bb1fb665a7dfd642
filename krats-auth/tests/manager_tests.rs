mod common;

use chrono::Duration;
use common::{STRONG, STRONG_2, fast_config, harness};
use krats_auth::{AuthError, Credential, PolicyViolation, SecurityManager};
use krats_types::{AuditAction, AuditOutcome, MemoryAuditSink};
use std::sync::Arc;

fn credential(h: &common::Harness, username: &str) -> Credential {
    h.manager.create_credential(username, STRONG).unwrap()
}

// ── credential creation ──────────────────────────────────────────

#[test]
fn create_credential_hashes_and_audits() {
    let h = harness();
    let cred = credential(&h, "dr.demir");
    assert_eq!(cred.username, "dr.demir");
    assert_ne!(cred.password_hash, STRONG);
    assert!(h.manager.verify_password(STRONG, &cred.password_hash));

    let created = h.audit.with_action(&AuditAction::UserCreated);
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].actor_id.as_str(), "dr.demir");
}

#[test]
fn create_credential_enforces_policy() {
    let h = harness();
    let err = h.manager.create_credential("dr.demir", "1234").unwrap_err();
    let AuthError::WeakPassword(result) = err else {
        panic!("expected WeakPassword, got {err:?}");
    };
    assert!(!result.is_acceptable());
    assert_eq!(h.audit.with_action(&AuditAction::PasswordRejected).len(), 1);
    assert!(h.audit.with_action(&AuditAction::UserCreated).is_empty());
}

#[test]
fn create_credential_rejects_bad_username() {
    let h = harness();
    assert!(matches!(
        h.manager.create_credential("  ", STRONG),
        Err(AuthError::InvalidUsername(_))
    ));
}

// ── authentication ───────────────────────────────────────────────

#[test]
fn authenticate_success_is_audited() {
    let h = harness();
    let cred = credential(&h, "dr.demir");
    h.manager.authenticate("dr.demir", STRONG, Some(&cred)).unwrap();

    let logins = h.audit.with_action(&AuditAction::Login);
    assert_eq!(logins.len(), 1);
    assert_eq!(logins[0].outcome, AuditOutcome::Success);
}

#[test]
fn wrong_password_is_invalid_credentials_and_audited() {
    let h = harness();
    let cred = credential(&h, "dr.demir");
    let err = h
        .manager
        .authenticate("dr.demir", "wrong-password", Some(&cred))
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));

    let failed = h.audit.with_action(&AuditAction::LoginFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].outcome, AuditOutcome::Failure);
}

#[test]
fn unknown_user_is_indistinguishable_from_wrong_password() {
    let h = harness();
    let err = h.manager.authenticate("ghost", STRONG, None).unwrap_err();
    assert_eq!(err.to_string(), AuthError::InvalidCredentials.to_string());
    assert_eq!(h.audit.with_action(&AuditAction::LoginFailed).len(), 1);
}

#[test]
fn credential_for_another_user_does_not_authenticate() {
    let h = harness();
    let cred = credential(&h, "dr.demir");
    assert!(h.manager.authenticate("nurse.kaya", STRONG, Some(&cred)).is_err());
}

#[test]
fn username_match_is_case_insensitive() {
    let h = harness();
    let cred = credential(&h, "dr.demir");
    assert!(h.manager.authenticate("DR.Demir", STRONG, Some(&cred)).is_ok());
}

#[test]
fn non_ascii_usernames_match_and_throttle_alike() {
    let h = harness();
    let cred = credential(&h, "Şule.Çelik");
    assert!(h.manager.authenticate("şule.çelik", STRONG, Some(&cred)).is_ok());

    for _ in 0..5 {
        let _ = h.manager.authenticate("ŞULE.ÇELIK ", "nope", Some(&cred));
    }
    let err = h
        .manager
        .authenticate("şule.çelik", STRONG, Some(&cred))
        .unwrap_err();
    assert!(matches!(err, AuthError::LockedOut { .. }));
}

#[test]
fn repeated_failures_lock_the_account() {
    let h = harness();
    let cred = credential(&h, "dr.demir");
    for _ in 0..5 {
        let _ = h.manager.authenticate("dr.demir", "nope", Some(&cred));
    }

    let err = h
        .manager
        .authenticate("dr.demir", STRONG, Some(&cred))
        .unwrap_err();
    assert!(matches!(err, AuthError::LockedOut { retry_after_secs: 900 }));
    assert!(!h.audit.with_action(&AuditAction::LoginLocked).is_empty());

    h.clock.advance(Duration::seconds(901));
    assert!(h.manager.authenticate("dr.demir", STRONG, Some(&cred)).is_ok());
}

#[test]
fn audit_failure_does_not_undo_login() {
    let h = harness();
    let cred = credential(&h, "dr.demir");
    h.audit.set_failing(true);
    assert!(h.manager.authenticate("dr.demir", STRONG, Some(&cred)).is_ok());
}

#[test]
fn manager_without_audit_sink_works() {
    let manager = SecurityManager::new(fast_config()).unwrap();
    let cred = manager.create_credential("solo", STRONG).unwrap();
    assert!(manager.authenticate("solo", STRONG, Some(&cred)).is_ok());
}

// ── password change ──────────────────────────────────────────────

#[test]
fn change_password_replaces_hash() {
    let h = harness();
    let cred = credential(&h, "dr.demir");
    let updated = h.manager.change_password(&cred, STRONG, STRONG_2).unwrap();

    assert!(h.manager.verify_password(STRONG_2, &updated.password_hash));
    assert!(!h.manager.verify_password(STRONG, &updated.password_hash));
    let changed = h.audit.with_action(&AuditAction::PasswordChanged);
    assert_eq!(changed.last().map(|e| e.outcome), Some(AuditOutcome::Success));
}

#[test]
fn change_password_requires_current() {
    let h = harness();
    let cred = credential(&h, "dr.demir");
    assert!(matches!(
        h.manager.change_password(&cred, "not-it", STRONG_2),
        Err(AuthError::InvalidCredentials)
    ));
}

#[test]
fn change_password_rejects_reuse_and_weak() {
    let h = harness();
    let cred = credential(&h, "dr.demir");

    let Err(AuthError::WeakPassword(result)) = h.manager.change_password(&cred, STRONG, STRONG)
    else {
        panic!("reuse accepted");
    };
    assert!(result.has(&PolicyViolation::ReusesCurrent));

    assert!(matches!(
        h.manager.change_password(&cred, STRONG, "short"),
        Err(AuthError::WeakPassword(_))
    ));
}

#[test]
fn logout_is_audited() {
    let audit = Arc::new(MemoryAuditSink::new());
    let manager = SecurityManager::new(fast_config())
        .unwrap()
        .with_audit(audit.clone());
    manager.record_logout("dr.demir");
    assert_eq!(audit.with_action(&AuditAction::Logout).len(), 1);
}

#[test]
fn check_strength_uses_configured_policy() {
    let h = harness();
    assert!(h.manager.check_strength(STRONG).is_acceptable());
    assert!(!h.manager.check_strength("abc").is_acceptable());
    assert_eq!(h.manager.policy().min_length, 12);
}
