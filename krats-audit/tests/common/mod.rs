//! Shared helpers for audit tests.

#![allow(dead_code)]

use krats_audit::{AlertSink, AuditAlert};
use krats_types::{ActorId, AuditAction, AuditEntry, AuditOutcome};
use std::sync::Mutex;

pub fn actor(name: &str) -> ActorId {
    ActorId::new(name).unwrap()
}

pub fn login(user: &str) -> AuditEntry {
    AuditEntry::new(actor(user), AuditAction::Login, user, AuditOutcome::Success)
}

pub fn failed_login(user: &str) -> AuditEntry {
    AuditEntry::new(actor(user), AuditAction::LoginFailed, user, AuditOutcome::Failure)
}

/// Collects alerts for inspection.
#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<AuditAlert>>,
}

impl RecordingAlerts {
    pub fn alerts(&self) -> Vec<AuditAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlerts {
    fn alert(&self, alert: &AuditAlert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}

/// Makes every further insert fail by dropping the table behind the log's
/// back. Triggers guard rows, not the schema.
pub fn break_store(db_path: &std::path::Path) {
    let conn = rusqlite::Connection::open(db_path).unwrap();
    conn.execute_batch("DROP TABLE audit_log;").unwrap();
}
