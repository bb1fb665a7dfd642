//! Session inactivity timeout.
//!
//! A session is expired once nothing has touched its [`ActivityTracker`]
//! for the configured timeout. The monitor then reports the expiry through
//! the core service, which audits it and broadcasts
//! [`CoreEvent::SessionExpired`](crate::CoreEvent::SessionExpired).

use crate::service::CoreHandle;
use krats_types::ActorId;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// Records the last user activity of one session.
#[derive(Debug, Clone)]
pub struct ActivityTracker {
    last: Arc<Mutex<Instant>>,
}

impl ActivityTracker {
    fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Marks the session as active now.
    pub fn touch(&self) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    /// Returns the time of the last activity.
    #[must_use]
    pub fn last_activity(&self) -> Instant {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns how long the session has been idle.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity().elapsed()
    }
}

/// Watches one session and expires it after `timeout` of inactivity.
pub struct InactivityMonitor {
    actor: ActorId,
    timeout: Duration,
    tracker: ActivityTracker,
    handle: CoreHandle,
}

impl InactivityMonitor {
    #[must_use]
    pub fn new(actor: ActorId, timeout: Duration, handle: CoreHandle) -> Self {
        Self {
            actor,
            timeout,
            tracker: ActivityTracker::new(),
            handle,
        }
    }

    /// Returns a tracker the UI layer touches on every user action.
    #[must_use]
    pub fn tracker(&self) -> ActivityTracker {
        self.tracker.clone()
    }

    /// Runs the monitor as a task. Abort the task when the user logs out.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Waits until the session has been idle for the timeout, then reports
    /// the expiry once.
    pub async fn run(self) {
        debug!(
            "Monitoring session of {} (timeout {:?})",
            self.actor, self.timeout
        );
        loop {
            let Some(deadline) = self.tracker.last_activity().checked_add(self.timeout) else {
                warn!(
                    "Inactivity timeout {:?} is out of range; session of {} never expires",
                    self.timeout, self.actor
                );
                return std::future::pending().await;
            };
            sleep_until(deadline).await;
            if self.tracker.idle_for() >= self.timeout {
                break;
            }
        }
        info!(
            "Session of {} idle for {:?}, expiring",
            self.actor, self.timeout
        );
        if let Err(e) = self.handle.session_expired(self.actor).await {
            warn!("Could not report session expiry: {}", e);
        }
    }
}
