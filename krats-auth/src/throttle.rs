//! Per-username login throttling.
//!
//! Failures are kept as a sliding log per username. Once `max_failures`
//! fall inside `window_secs`, further attempts are refused until the oldest
//! failure ages out. A successful login clears the log.
//!
//! An attempt must be reserved with [`LoginThrottle::begin_attempt`] before
//! the password is verified. Reservations still in flight count against
//! `max_failures`, so concurrent guesses cannot all slip past the check
//! before the first failure is recorded.

use chrono::{DateTime, Duration, Utc};
use krats_types::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Longest accepted throttle window (30 days).
pub const MAX_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;

/// Tracked usernames below which only the time-based sweep runs.
const SWEEP_MIN_ENTRIES: usize = 1024;

/// Throttle thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Failures tolerated inside one window.
    pub max_failures: u32,
    /// Window length in seconds, at most [`MAX_WINDOW_SECS`].
    pub window_secs: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            window_secs: 900,
        }
    }
}

/// Canonical form of a username for lookups and throttling.
#[must_use]
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

#[derive(Debug, Default)]
struct Entry {
    failures: VecDeque<DateTime<Utc>>,
    in_flight: u32,
}

impl Entry {
    fn is_idle(&self) -> bool {
        self.failures.is_empty() && self.in_flight == 0
    }

    fn used(&self) -> usize {
        self.failures.len() + self.in_flight as usize
    }
}

struct State {
    entries: HashMap<String, Entry>,
    last_sweep: DateTime<Utc>,
    sweep_at: usize,
}

impl State {
    /// Drops usernames whose failures have all aged out. Runs once per
    /// window, or earlier when the map has doubled since the last sweep.
    fn sweep_if_due(&mut self, now: DateTime<Utc>, window: Duration) {
        let due = self
            .last_sweep
            .checked_add_signed(window)
            .is_some_and(|at| at <= now);
        if !due && self.entries.len() < self.sweep_at {
            return;
        }
        self.entries.retain(|_, entry| {
            prune(&mut entry.failures, now, window);
            !entry.is_idle()
        });
        self.last_sweep = now;
        self.sweep_at = (self.entries.len() * 2).max(SWEEP_MIN_ENTRIES);
    }

    fn remove_if_idle(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(Entry::is_idle) {
            self.entries.remove(key);
        }
    }
}

/// Tracks recent login failures per username.
pub struct LoginThrottle {
    config: ThrottleConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl LoginThrottle {
    /// Creates a throttle on the system clock.
    #[must_use]
    pub fn new(config: ThrottleConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a throttle reading time from `clock`.
    #[must_use]
    pub fn with_clock(config: ThrottleConfig, clock: Arc<dyn Clock>) -> Self {
        let last_sweep = clock.now();
        Self {
            config,
            clock,
            state: Mutex::new(State {
                entries: HashMap::new(),
                last_sweep,
                sweep_at: SWEEP_MIN_ENTRIES,
            }),
        }
    }

    fn window(&self) -> Duration {
        let secs = self.config.window_secs.min(MAX_WINDOW_SECS);
        Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reserves one attempt for `username`, or returns
    /// `Err(retry_after_secs)` if the account is locked.
    ///
    /// The reservation counts as a pending failure until it is settled with
    /// [`Attempt::succeed`] or [`Attempt::fail`]. Dropping it unsettled
    /// releases it without recording anything.
    pub fn begin_attempt(&self, username: &str) -> Result<Attempt<'_>, u64> {
        let now = self.clock.now();
        let window = self.window();
        let key = normalize_username(username);
        let mut state = self.lock();
        state.sweep_if_due(now, window);

        let entry = state.entries.entry(key.clone()).or_default();
        prune(&mut entry.failures, now, window);
        self.admit(entry, now, window)?;
        entry.in_flight += 1;
        Ok(Attempt {
            throttle: self,
            key,
            settled: false,
        })
    }

    /// Returns `Err(retry_after_secs)` if `username` is currently locked.
    pub fn check(&self, username: &str) -> Result<(), u64> {
        let now = self.clock.now();
        let window = self.window();
        let key = normalize_username(username);
        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(&key) else {
            return Ok(());
        };
        prune(&mut entry.failures, now, window);
        let result = self.admit(entry, now, window);
        state.remove_if_idle(&key);
        result
    }

    /// Records a failed attempt. Returns true if the account is now locked.
    pub fn record_failure(&self, username: &str) -> bool {
        let now = self.clock.now();
        let window = self.window();
        let mut state = self.lock();
        state.sweep_if_due(now, window);
        let entry = state.entries.entry(normalize_username(username)).or_default();
        self.push_failure(entry, now, window)
    }

    /// Clears the failure log after a successful login.
    pub fn record_success(&self, username: &str) {
        let key = normalize_username(username);
        let mut state = self.lock();
        if let Some(entry) = state.entries.get_mut(&key) {
            entry.failures.clear();
        }
        state.remove_if_idle(&key);
    }

    /// Returns how many attempts `username` has left in the current window.
    #[must_use]
    pub fn remaining_attempts(&self, username: &str) -> u32 {
        let now = self.clock.now();
        let window = self.window();
        let key = normalize_username(username);
        let mut state = self.lock();
        let used = state.entries.get_mut(&key).map_or(0, |entry| {
            prune(&mut entry.failures, now, window);
            entry.used()
        });
        state.remove_if_idle(&key);
        self.config
            .max_failures
            .saturating_sub(u32::try_from(used).unwrap_or(u32::MAX))
    }

    /// Returns how many usernames currently hold throttle state.
    #[must_use]
    pub fn tracked_usernames(&self) -> usize {
        self.lock().entries.len()
    }

    fn admit(&self, entry: &Entry, now: DateTime<Utc>, window: Duration) -> Result<(), u64> {
        let max = self.config.max_failures as usize;
        if max == 0 || entry.used() < max {
            return Ok(());
        }
        if entry.failures.len() < max {
            // Blocked only by attempts still being verified.
            return Err(1);
        }
        let wait = entry
            .failures
            .front()
            .and_then(|oldest| oldest.checked_add_signed(window))
            .map_or(MAX_WINDOW_SECS, |unlock_at| {
                u64::try_from((unlock_at - now).num_seconds().max(1)).unwrap_or(1)
            });
        Err(wait)
    }

    fn push_failure(&self, entry: &mut Entry, now: DateTime<Utc>, window: Duration) -> bool {
        prune(&mut entry.failures, now, window);
        entry.failures.push_back(now);
        self.config.max_failures > 0 && entry.failures.len() >= self.config.max_failures as usize
    }

    fn settle(&self, key: &str, failed: bool) -> bool {
        let now = self.clock.now();
        let window = self.window();
        let mut state = self.lock();
        let entry = state.entries.entry(key.to_string()).or_default();
        entry.in_flight = entry.in_flight.saturating_sub(1);
        let locked = if failed {
            self.push_failure(entry, now, window)
        } else {
            entry.failures.clear();
            false
        };
        state.remove_if_idle(key);
        locked
    }

    fn release(&self, key: &str) {
        let mut state = self.lock();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.in_flight = entry.in_flight.saturating_sub(1);
        }
        state.remove_if_idle(key);
    }
}

impl std::fmt::Debug for LoginThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginThrottle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A reserved login attempt. See [`LoginThrottle::begin_attempt`].
#[must_use = "an attempt must be settled with succeed() or fail()"]
pub struct Attempt<'a> {
    throttle: &'a LoginThrottle,
    key: String,
    settled: bool,
}

impl Attempt<'_> {
    /// Settles the attempt as a successful login, clearing the failure log.
    pub fn succeed(mut self) {
        self.settled = true;
        self.throttle.settle(&self.key, false);
    }

    /// Settles the attempt as a failure. Returns true if the account is now
    /// locked.
    pub fn fail(mut self) -> bool {
        self.settled = true;
        self.throttle.settle(&self.key, true)
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.throttle.release(&self.key);
        }
    }
}

impl std::fmt::Debug for Attempt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attempt").field("key", &self.key).finish()
    }
}

/// Drops failures older than `window`. A failure whose expiry is not
/// representable never ages out.
fn prune(log: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) {
    while log
        .front()
        .and_then(|t| t.checked_add_signed(window))
        .is_some_and(|expires| expires <= now)
    {
        log.pop_front();
    }
}
