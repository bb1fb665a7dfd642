mod common;

use chrono::Duration;
use common::{epoch, expiring_for, harness, hwid, issuer, other_secret, perpetual_for};
use krats_license::{
    LicenseError, LicenseIssuer, LicenseRecord, LicenseRequest, LicenseStatus,
};
use krats_types::{AuditAction, AuditOutcome, MemoryAuditSink};
use std::sync::Arc;

// ── status machine ───────────────────────────────────────────────

#[test]
fn no_license_is_missing() {
    let h = harness("clinic-a");
    assert_eq!(h.manager.check().unwrap(), LicenseStatus::Missing);
    assert!(matches!(h.manager.require_valid(), Err(LicenseError::Missing)));
}

#[test]
fn activated_license_is_valid() {
    let h = harness("clinic-a");
    let record = perpetual_for("clinic-a");
    h.manager.activate(&record.to_key_string()).unwrap();

    assert_eq!(h.manager.check().unwrap(), LicenseStatus::Valid);
    let valid = h.manager.require_valid().unwrap();
    assert_eq!(valid.license_id(), record.license_id());
}

#[test]
fn license_for_other_machine_is_hardware_mismatch() {
    let h = harness("clinic-b");
    let key = perpetual_for("clinic-a").to_key_string();
    assert_eq!(h.manager.evaluate(&key), LicenseStatus::HardwareMismatch);
}

#[test]
fn expired_license_is_expired_never_valid() {
    let h = harness("clinic-a");
    let record = expiring_for("clinic-a", 30);
    h.manager.activate(&record.to_key_string()).unwrap();

    h.clock.advance(Duration::days(31));
    assert_eq!(h.manager.check().unwrap(), LicenseStatus::Expired);
    assert!(matches!(h.manager.require_valid(), Err(LicenseError::Expired)));
}

#[test]
fn license_expiring_exactly_now_is_expired() {
    let h = harness("clinic-a");
    let key = expiring_for("clinic-a", 0).to_key_string();
    assert_eq!(h.manager.evaluate(&key), LicenseStatus::Expired);
}

#[test]
fn altered_record_is_tampered_not_expired() {
    let h = harness("clinic-a");
    let record = expiring_for("clinic-a", -10);
    let key = record.to_key_string();
    let (_, sig) = key.split_once('.').unwrap();

    let mut payload = record.payload().clone();
    payload.expires_at = Some(epoch() + Duration::days(3650));
    let forged = LicenseRecord::sign(payload, b"some other secret value")
        .unwrap()
        .to_key_string();
    let (forged_payload, _) = forged.split_once('.').unwrap();

    let status = h.manager.evaluate(&format!("{forged_payload}.{sig}"));
    assert_eq!(status, LicenseStatus::Tampered);
}

#[test]
fn signature_is_checked_before_hardware_and_expiry() {
    let h = harness("clinic-b");
    // Wrong machine and expired, but signed with another secret.
    let record = LicenseIssuer::with_clock(other_secret(), common::clock())
        .issue(
            LicenseRequest::new("X", hwid("clinic-a")).expires_at(epoch() - Duration::days(1)),
        )
        .unwrap();
    assert_eq!(
        h.manager.evaluate(&record.to_key_string()),
        LicenseStatus::Tampered
    );
}

#[test]
fn corrupted_license_file_is_tampered() {
    let h = harness("clinic-a");
    std::fs::write(h.manager.store().path(), "garbage-without-dot").unwrap();
    assert_eq!(h.manager.check().unwrap(), LicenseStatus::Tampered);
}

#[test]
fn edited_license_file_is_tampered() {
    let h = harness("clinic-a");
    let record = perpetual_for("clinic-a");
    h.manager.activate(&record.to_key_string()).unwrap();

    let mut payload = record.payload().clone();
    payload.seat_limit = Some(1000);
    let forged = LicenseRecord::sign(payload, b"attacker-chosen-secret")
        .unwrap()
        .to_key_string();
    let (forged_payload, _) = forged.split_once('.').unwrap();
    let original = record.to_key_string();
    let (_, sig) = original.split_once('.').unwrap();
    std::fs::write(h.manager.store().path(), format!("{forged_payload}.{sig}")).unwrap();

    assert_eq!(h.manager.check().unwrap(), LicenseStatus::Tampered);
}

#[test]
fn every_check_revalidates() {
    let h = harness("clinic-a");
    h.manager
        .activate(&expiring_for("clinic-a", 1).to_key_string())
        .unwrap();
    assert_eq!(h.manager.check().unwrap(), LicenseStatus::Valid);
    h.clock.advance(Duration::days(2));
    assert_eq!(h.manager.check().unwrap(), LicenseStatus::Expired);
}

// ── activation ───────────────────────────────────────────────────

#[test]
fn activating_mismatched_key_does_not_persist() {
    let h = harness("clinic-b");
    let key = perpetual_for("clinic-a").to_key_string();

    let err = h.manager.activate(&key).unwrap_err();
    assert!(matches!(err, LicenseError::HardwareMismatch));
    assert!(!h.manager.store().path().exists());
    assert_eq!(h.manager.check().unwrap(), LicenseStatus::Missing);
}

#[test]
fn failed_activation_keeps_prior_license() {
    let h = harness("clinic-a");
    let good = perpetual_for("clinic-a");
    h.manager.activate(&good.to_key_string()).unwrap();

    let expired = expiring_for("clinic-a", -1).to_key_string();
    assert!(matches!(
        h.manager.activate(&expired),
        Err(LicenseError::Expired)
    ));
    assert!(matches!(
        h.manager.activate("not a key"),
        Err(LicenseError::InvalidKeyFormat(_))
    ));

    assert_eq!(h.manager.check().unwrap(), LicenseStatus::Valid);
    assert_eq!(
        h.manager.require_valid().unwrap().license_id(),
        good.license_id()
    );
}

#[test]
fn activation_replaces_previous_license() {
    let h = harness("clinic-a");
    h.manager
        .activate(&perpetual_for("clinic-a").to_key_string())
        .unwrap();
    let renewal = expiring_for("clinic-a", 365);
    h.manager.activate(&renewal.to_key_string()).unwrap();

    let current = h.manager.current_record().unwrap().unwrap();
    assert_eq!(current.license_id(), renewal.license_id());
}

#[test]
fn activation_is_audited_without_raw_key() {
    let audit = Arc::new(MemoryAuditSink::new());
    let h = harness("clinic-a");
    let manager = h.manager.with_audit(audit.clone());

    let record = perpetual_for("clinic-a");
    let key = record.to_key_string();
    manager.activate(&key).unwrap();
    let _ = manager.activate(&perpetual_for("clinic-z").to_key_string());

    let entries = audit.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, AuditAction::LicenseActivated);
    assert_eq!(entries[0].target, record.redacted_id());
    assert_eq!(entries[1].action, AuditAction::LicenseRejected);
    assert_eq!(entries[1].outcome, AuditOutcome::Denied);
    for entry in &entries {
        assert_ne!(entry.target, key);
        assert!(entry.target.len() <= 12);
    }
}

// ── info and seats ───────────────────────────────────────────────

#[test]
fn current_record_hides_unverified_files() {
    let h = harness("clinic-a");
    assert!(h.manager.current_record().unwrap().is_none());

    let foreign = LicenseIssuer::new(other_secret())
        .issue(LicenseRequest::new("X", hwid("clinic-a")))
        .unwrap();
    std::fs::write(h.manager.store().path(), foreign.to_key_string()).unwrap();
    assert!(h.manager.current_record().unwrap().is_none());
}

#[test]
fn current_record_reports_expired_license() {
    let h = harness("clinic-a");
    h.manager
        .activate(&expiring_for("clinic-a", 1).to_key_string())
        .unwrap();
    h.clock.advance(Duration::days(5));
    let record = h.manager.current_record().unwrap().unwrap();
    assert_eq!(record.licensee(), "Şifa Klinik");
}

#[test]
fn seat_limit_is_enforced() {
    let h = harness("clinic-a");
    h.manager
        .activate(&perpetual_for("clinic-a").to_key_string())
        .unwrap();

    assert!(h.manager.check_seat_limit(2).is_ok());
    assert!(matches!(
        h.manager.check_seat_limit(3),
        Err(LicenseError::SeatLimitExceeded { limit: 3, current: 3 })
    ));
}

#[test]
fn unlimited_seats() {
    let h = harness("clinic-a");
    let record = issuer(common::clock())
        .issue(LicenseRequest::new("Büyük Hastane", hwid("clinic-a")))
        .unwrap();
    h.manager.activate(&record.to_key_string()).unwrap();
    assert!(h.manager.check_seat_limit(10_000).is_ok());
}

#[test]
fn seat_check_requires_valid_license() {
    let h = harness("clinic-a");
    assert!(matches!(
        h.manager.check_seat_limit(0),
        Err(LicenseError::Missing)
    ));
}

#[test]
fn unreadable_license_path_is_storage_error() {
    let h = harness("clinic-a");
    std::fs::create_dir(h.manager.store().path()).unwrap();
    assert!(matches!(h.manager.check(), Err(LicenseError::Storage(_))));
}

#[test]
fn hardware_id_is_fresh_fingerprint() {
    let h = harness("clinic-a");
    assert_eq!(h.manager.hardware_id(), hwid("clinic-a"));
}
