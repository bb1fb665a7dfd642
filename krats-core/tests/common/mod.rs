//! Shared helpers for core tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use krats_core::CoreConfig;
use krats_crypto::{EnvLookup, SecretMaterial};
use krats_license::{
    HardwareFingerprint, IdentifierSource, LicenseIssuer, LicenseRequest, LicenseStore,
    StaticSource,
};
use krats_types::FixedClock;
use std::collections::HashMap;
use std::sync::Arc;

pub const SALT: &str = "core-test-salt";

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
}

pub fn signing_secret() -> SecretMaterial {
    SecretMaterial::from_bytes(vec![0x5a; 32])
}

pub fn fingerprint(machine_id: &str) -> HardwareFingerprint {
    let sources: Vec<Box<dyn IdentifierSource>> = vec![
        Box::new(StaticSource::stable("machine-id", Some(machine_id))),
        Box::new(StaticSource::stable("product-uuid", Some("4c4c4544-0042"))),
    ];
    HardwareFingerprint::with_sources(SALT, sources)
}

/// Supplies the license signing secret the way an installer would.
pub fn env_with_secret() -> EnvLookup {
    let vars: HashMap<String, String> = HashMap::from([(
        "KRATS_LICENSE_SECRET".to_string(),
        signing_secret().to_base64(),
    )]);
    Arc::new(move |name| vars.get(name).cloned())
}

/// A temporary installation directory.
pub struct Install {
    pub dir: tempfile::TempDir,
    pub config: CoreConfig,
    pub clock: Arc<FixedClock>,
}

impl Install {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CoreConfig::default();
        config.paths.data_dir = Some(dir.path().to_path_buf());
        // Keep hashing fast in tests.
        config.hashing.memory_cost_kib = 256;
        config.hashing.time_cost = 1;
        Self {
            dir,
            config,
            clock: Arc::new(FixedClock::new(now())),
        }
    }

    /// Issues and stores a license for `machine_id`, optionally expiring.
    pub fn license_for(&self, machine_id: &str, valid_days: Option<i64>) {
        let issuer = LicenseIssuer::with_clock(Arc::new(signing_secret()), self.clock.clone());
        let mut request =
            LicenseRequest::new("Anadolu Diş Kliniği", fingerprint(machine_id).compute()).seat_limit(5);
        if let Some(days) = valid_days {
            request = request.expires_at(now() + Duration::days(days));
        }
        let record = issuer.issue(request).unwrap();
        LicenseStore::new(self.config.license_path())
            .save(&record.to_key_string())
            .unwrap();
    }

    pub fn bootstrap(&self, machine_id: &str) -> krats_core::StartupResult<krats_core::TrustContext> {
        krats_core::TrustContext::builder(self.config.clone())
            .fingerprint(fingerprint(machine_id))
            .env_lookup(env_with_secret())
            .clock(self.clock.clone())
            .run()
    }
}
