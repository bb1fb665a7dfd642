//! Monotonic timestamps for the audit trail.
//!
//! Audit entries are ordered by write order, not by wall-clock precision.
//! Two entries appended within the same millisecond (or after the system
//! clock stepped backwards) still get strictly increasing timestamps:
//! - `wall_time`: milliseconds since the Unix epoch, never decreasing
//! - `logical`: counter that breaks ties inside one wall-clock millisecond

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A hybrid logical clock timestamp attached to each audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditTimestamp {
    wall_time: u64,
    logical: u32,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl AuditTimestamp {
    /// Creates a timestamp at the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self {
            wall_time: now_millis(),
            logical: 0,
        }
    }

    /// Creates a timestamp from components.
    #[must_use]
    pub const fn new(wall_time: u64, logical: u32) -> Self {
        Self { wall_time, logical }
    }

    /// Returns the wall time component (milliseconds since the epoch).
    #[must_use]
    pub const fn wall_time(&self) -> u64 {
        self.wall_time
    }

    /// Returns the logical counter.
    #[must_use]
    pub const fn logical(&self) -> u32 {
        self.logical
    }

    /// Returns the next timestamp strictly greater than `self`.
    #[must_use]
    pub fn tick(&self) -> Self {
        self.tick_at(now_millis())
    }

    /// Same as [`tick`](Self::tick) with an explicit wall-clock reading.
    #[must_use]
    pub fn tick_at(&self, now: u64) -> Self {
        if now > self.wall_time {
            Self {
                wall_time: now,
                logical: 0,
            }
        } else if self.logical == u32::MAX {
            Self {
                wall_time: self.wall_time + 1,
                logical: 0,
            }
        } else {
            Self {
                wall_time: self.wall_time,
                logical: self.logical + 1,
            }
        }
    }

    /// Converts the wall time component to a UTC datetime.
    #[must_use]
    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.wall_time as i64)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Default for AuditTimestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl PartialOrd for AuditTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AuditTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.wall_time.cmp(&other.wall_time) {
            Ordering::Equal => self.logical.cmp(&other.logical),
            other => other,
        }
    }
}

impl fmt::Display for AuditTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}+{}",
            self.to_datetime().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            self.logical
        )
    }
}
