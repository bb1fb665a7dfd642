//! Shared test helpers for license tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use krats_crypto::SecretMaterial;
use krats_license::{
    HardwareFingerprint, HardwareId, IdentifierSource, LicenseIssuer, LicenseManager,
    LicenseRecord, LicenseRequest, LicenseStore, StaticSource,
};
use krats_types::FixedClock;
use std::sync::Arc;

pub const SALT: &str = "test-salt";

/// Deterministic signing secret.
pub fn test_secret() -> Arc<SecretMaterial> {
    Arc::new(SecretMaterial::from_bytes((1..=32).collect()))
}

pub fn other_secret() -> Arc<SecretMaterial> {
    Arc::new(SecretMaterial::from_bytes((101..=132).collect()))
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 8, 30, 0).unwrap()
}

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(epoch()))
}

/// A fingerprint over two fixed stable identifiers.
pub fn machine(machine_id: &str) -> HardwareFingerprint {
    let sources: Vec<Box<dyn IdentifierSource>> = vec![
        Box::new(StaticSource::stable("machine-id", Some(machine_id))),
        Box::new(StaticSource::stable("product-uuid", Some("4c4c4544-0031"))),
    ];
    HardwareFingerprint::with_sources(SALT, sources)
}

pub fn hwid(machine_id: &str) -> HardwareId {
    machine(machine_id).compute()
}

pub fn issuer(clock: Arc<FixedClock>) -> LicenseIssuer {
    LicenseIssuer::with_clock(test_secret(), clock)
}

/// Issues a perpetual license for `machine_id`.
pub fn perpetual_for(machine_id: &str) -> LicenseRecord {
    issuer(clock())
        .issue(LicenseRequest::new("Şifa Klinik", hwid(machine_id)).seat_limit(3))
        .unwrap()
}

/// Issues a license for `machine_id` expiring `days` after the test epoch.
pub fn expiring_for(machine_id: &str, days: i64) -> LicenseRecord {
    issuer(clock())
        .issue(
            LicenseRequest::new("Şifa Klinik", hwid(machine_id))
                .expires_at(epoch() + Duration::days(days)),
        )
        .unwrap()
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub clock: Arc<FixedClock>,
    pub manager: LicenseManager,
}

/// A manager running on machine `machine_id` with an empty license dir.
pub fn harness(machine_id: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();
    let manager = LicenseManager::new(
        LicenseStore::in_dir(dir.path()),
        test_secret(),
        machine(machine_id),
    )
    .with_clock(clock.clone());
    Harness {
        dir,
        clock,
        manager,
    }
}
