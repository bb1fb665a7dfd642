//! The SQLite-backed audit log.

use crate::alert::{AlertSink, AuditAlert, TracingAlertSink};
use crate::error::{AuditError, AuditResult};
use crate::fallback::{FALLBACK_FILE_NAME, FallbackLog};
use chrono::{DateTime, Utc};
use krats_types::{
    ActorId, AuditAction, AuditEntry, AuditOutcome, AuditSink, AuditTimestamp, AuditWriteError,
};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS audit_log (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        wall_time INTEGER NOT NULL,
        logical INTEGER NOT NULL,
        actor_id TEXT NOT NULL,
        action TEXT NOT NULL,
        target TEXT NOT NULL,
        outcome TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS audit_log_actor ON audit_log (actor_id);

    CREATE TRIGGER IF NOT EXISTS audit_log_no_update
    BEFORE UPDATE ON audit_log
    BEGIN
        SELECT RAISE(ABORT, 'audit_log is append-only');
    END;

    CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
    BEFORE DELETE ON audit_log
    BEGIN
        SELECT RAISE(ABORT, 'audit_log is append-only');
    END;
";

const SELECT_COLUMNS: &str = "SELECT seq, wall_time, logical, actor_id, action, target, outcome FROM audit_log";

/// An audit row as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub seq: u64,
    pub entry: AuditEntry,
}

struct Inner {
    conn: Connection,
    last: Option<AuditTimestamp>,
}

/// Append-only audit trail.
///
/// Appends are serialized through one mutex, which also owns the
/// timestamp clock: the entry's timestamp is assigned under the lock, so
/// sequence order, timestamp order and write order always agree.
#[derive(Clone)]
pub struct AuditLog {
    inner: Arc<Mutex<Inner>>,
    fallback: Option<FallbackLog>,
    alerts: Arc<dyn AlertSink>,
}

impl AuditLog {
    /// Opens (or creates) the audit database at `path`, with the fallback
    /// file next to it.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AuditError::Open(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| AuditError::Open(format!("failed to open audit store: {e}")))?;
        let fallback = FallbackLog::new(path.with_file_name(FALLBACK_FILE_NAME));
        Self::from_connection(conn, Some(fallback))
    }

    /// Opens an in-memory audit log with no fallback file (for tests and
    /// offline tools).
    pub fn in_memory() -> AuditResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AuditError::Open(format!("failed to open in-memory audit store: {e}")))?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, fallback: Option<FallbackLog>) -> AuditResult<Self> {
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(|e| AuditError::Open(format!("failed to set synchronous mode: {e}")))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| AuditError::Open(format!("failed to init audit schema: {e}")))?;

        let last = conn
            .query_row(
                "SELECT wall_time, logical FROM audit_log ORDER BY seq DESC LIMIT 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(|e| AuditError::Open(format!("failed to read last audit entry: {e}")))?
            .map(|(wall, logical)| AuditTimestamp::new(wall as u64, logical as u32));

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner { conn, last })),
            fallback,
            alerts: Arc::new(TracingAlertSink),
        })
    }

    /// Uses `fallback` for entries the database rejects.
    #[must_use]
    pub fn with_fallback(mut self, fallback: FallbackLog) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Sends write failures to `alerts` instead of the log.
    #[must_use]
    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    #[must_use]
    pub fn fallback(&self) -> Option<&FallbackLog> {
        self.fallback.as_ref()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends `entry` and returns its sequence number.
    ///
    /// The entry's timestamp is replaced with the log's own, strictly
    /// greater than every earlier entry's. The row is durable on return.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Write`] if the row could not be stored. By
    /// then the entry has been offered to the fallback file and the alert
    /// sink.
    pub fn append(&self, mut entry: AuditEntry) -> AuditResult<u64> {
        let mut inner = self.lock();
        entry.timestamp = inner.last.map_or_else(AuditTimestamp::now, |last| last.tick());
        inner.last = Some(entry.timestamp);

        let inserted = inner.conn.execute(
            "INSERT INTO audit_log (wall_time, logical, actor_id, action, target, outcome)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.timestamp.wall_time() as i64,
                i64::from(entry.timestamp.logical()),
                entry.actor_id.as_str(),
                entry.action.as_str(),
                entry.target,
                entry.outcome.as_str(),
            ],
        );

        match inserted {
            Ok(_) => {
                let seq = inner.conn.last_insert_rowid() as u64;
                debug!("Audit #{} {} {}", seq, entry.action, entry.outcome);
                Ok(seq)
            }
            Err(source) => {
                // Held through the fallback write so its lines keep timestamp order.
                let fallback_persisted = self.write_fallback(&entry);
                drop(inner);
                self.alerts.alert(&AuditAlert {
                    timestamp: entry.timestamp,
                    action: entry.action.clone(),
                    reason: source.to_string(),
                    fallback_persisted,
                });
                Err(AuditError::Write {
                    source,
                    fallback_persisted,
                })
            }
        }
    }

    fn write_fallback(&self, entry: &AuditEntry) -> bool {
        let Some(fallback) = &self.fallback else {
            return false;
        };
        match fallback.append(entry) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to write audit fallback {}: {}",
                    fallback.path().display(),
                    e
                );
                false
            }
        }
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Returns entries in write order, paginated.
    pub fn entries(&self, limit: usize, offset: usize) -> AuditResult<Vec<StoredEntry>> {
        self.query(
            &format!("{SELECT_COLUMNS} ORDER BY seq ASC LIMIT ?1 OFFSET ?2"),
            params![limit as i64, offset as i64],
        )
    }

    /// Returns the newest `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> AuditResult<Vec<StoredEntry>> {
        self.query(
            &format!("{SELECT_COLUMNS} ORDER BY seq DESC LIMIT ?1"),
            params![limit as i64],
        )
    }

    /// Returns the newest `limit` entries recorded for `actor`, newest first.
    pub fn by_actor(&self, actor: &ActorId, limit: usize) -> AuditResult<Vec<StoredEntry>> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE actor_id = ?1 ORDER BY seq DESC LIMIT ?2"),
            params![actor.as_str(), limit as i64],
        )
    }

    /// Returns entries written at or after `since`, in write order.
    pub fn since(&self, since: DateTime<Utc>, limit: usize) -> AuditResult<Vec<StoredEntry>> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE wall_time >= ?1 ORDER BY seq ASC LIMIT ?2"),
            params![since.timestamp_millis(), limit as i64],
        )
    }

    /// Returns the total number of entries.
    pub fn count(&self) -> AuditResult<u64> {
        let inner = self.lock();
        let count: i64 = inner
            .conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(|e| AuditError::Query(format!("failed to count audit log: {e}")))?;
        Ok(count as u64)
    }

    /// Returns the number of entries per action, most frequent first.
    pub fn count_by_action(&self) -> AuditResult<Vec<(AuditAction, u64)>> {
        let inner = self.lock();
        let mut stmt = inner
            .conn
            .prepare(
                "SELECT action, COUNT(*) AS n FROM audit_log
                 GROUP BY action ORDER BY n DESC, action ASC",
            )
            .map_err(|e| AuditError::Query(format!("failed to prepare action count: {e}")))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| AuditError::Query(format!("failed to count actions: {e}")))?;

        let mut result = Vec::new();
        for row in rows {
            let (action, n) =
                row.map_err(|e| AuditError::Query(format!("failed to read action count: {e}")))?;
            let action = action
                .parse()
                .map_err(|e| AuditError::Query(format!("invalid action in audit: {e}")))?;
            result.push((action, n as u64));
        }
        Ok(result)
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> AuditResult<Vec<StoredEntry>> {
        let inner = self.lock();
        let mut stmt = inner
            .conn
            .prepare(sql)
            .map_err(|e| AuditError::Query(format!("failed to prepare audit query: {e}")))?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(RawRow {
                    seq: row.get(0)?,
                    wall_time: row.get(1)?,
                    logical: row.get(2)?,
                    actor_id: row.get(3)?,
                    action: row.get(4)?,
                    target: row.get(5)?,
                    outcome: row.get(6)?,
                })
            })
            .map_err(|e| AuditError::Query(format!("failed to query audit log: {e}")))?;

        let mut result = Vec::new();
        for row in rows {
            let row = row.map_err(|e| AuditError::Query(format!("failed to read audit row: {e}")))?;
            result.push(row.into_stored()?);
        }
        Ok(result)
    }
}

impl AuditSink for AuditLog {
    fn record(&self, entry: AuditEntry) -> Result<u64, AuditWriteError> {
        self.append(entry).map_err(|e| AuditWriteError {
            reason: e.to_string(),
            fallback_persisted: e.fallback_persisted(),
        })
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

struct RawRow {
    seq: i64,
    wall_time: i64,
    logical: i64,
    actor_id: String,
    action: String,
    target: String,
    outcome: String,
}

impl RawRow {
    fn into_stored(self) -> AuditResult<StoredEntry> {
        let invalid = |what: &str, e: krats_types::Error| {
            AuditError::Query(format!("invalid {what} in audit row {}: {e}", self.seq))
        };
        let actor_id = ActorId::new(self.actor_id.as_str()).map_err(|e| invalid("actor_id", e))?;
        let action: AuditAction = self.action.parse().map_err(|e| invalid("action", e))?;
        let outcome: AuditOutcome = self.outcome.parse().map_err(|e| invalid("outcome", e))?;
        Ok(StoredEntry {
            seq: self.seq as u64,
            entry: AuditEntry {
                timestamp: AuditTimestamp::new(self.wall_time as u64, self.logical as u32),
                actor_id,
                action,
                target: self.target,
                outcome,
            },
        })
    }
}
