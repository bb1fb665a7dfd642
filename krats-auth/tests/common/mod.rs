#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use krats_auth::{AuthConfig, HashingParams, SecurityManager};
use krats_types::{FixedClock, MemoryAuditSink};
use std::sync::Arc;

/// Cheap Argon2 parameters so tests stay fast.
pub fn fast_params() -> HashingParams {
    HashingParams {
        memory_cost_kib: 256,
        time_cost: 1,
        parallelism: 1,
    }
}

pub fn fast_config() -> AuthConfig {
    AuthConfig {
        hashing: fast_params(),
        ..AuthConfig::default()
    }
}

pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
    ))
}

pub struct Harness {
    pub manager: SecurityManager,
    pub clock: Arc<FixedClock>,
    pub audit: Arc<MemoryAuditSink>,
}

pub fn harness() -> Harness {
    let clock = fixed_clock();
    let audit = Arc::new(MemoryAuditSink::new());
    let manager = SecurityManager::with_clock(fast_config(), clock.clone())
        .unwrap()
        .with_audit(audit.clone());
    Harness {
        manager,
        clock,
        audit,
    }
}

pub const STRONG: &str = "Tr0ub4dor&3x";
pub const STRONG_2: &str = "Kestane-Sekiz-91";
