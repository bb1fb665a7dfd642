//! Escalation of audit write failures.
//!
//! Losing an audit row is a compliance event in its own right, so every
//! failed write is reported to an [`AlertSink`] in addition to the
//! caller's own warning.

use krats_types::{AuditAction, AuditTimestamp};
use tracing::error;

/// A failed audit write, described without its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditAlert {
    pub timestamp: AuditTimestamp,
    pub action: AuditAction,
    pub reason: String,
    pub fallback_persisted: bool,
}

/// Receives audit write failures.
pub trait AlertSink: Send + Sync {
    fn alert(&self, alert: &AuditAlert);
}

/// Reports alerts at `error` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, alert: &AuditAlert) {
        if alert.fallback_persisted {
            error!(
                "Audit store rejected {} entry at {}; saved to fallback file: {}",
                alert.action, alert.timestamp, alert.reason
            );
        } else {
            error!(
                "Audit entry {} at {} LOST (store and fallback failed): {}",
                alert.action, alert.timestamp, alert.reason
            );
        }
    }
}
