//! Online/offline detection
//!
//! The OS connectivity signal is authoritative. Without it, the host is
//! considered offline after [`OFFLINE_THRESHOLD`] consecutive failed probes
//! and back online at the next success. Informational only: no alert is
//! ever raised from here.

use std::sync::Mutex;
use tokio::sync::watch;

pub const OFFLINE_THRESHOLD: u32 = 3;

#[derive(Debug, Default)]
struct DetectorState {
    os_offline: bool,
    consecutive_failures: u32,
}

impl DetectorState {
    fn offline(&self) -> bool {
        self.os_offline || self.consecutive_failures >= OFFLINE_THRESHOLD
    }
}

/// Tracks whether the host is reachable at all
#[derive(Debug)]
pub struct OfflineDetector {
    state: Mutex<DetectorState>,
    tx: watch::Sender<bool>,
}

impl Default for OfflineDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineDetector {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Mutex::new(DetectorState::default()),
            tx,
        }
    }

    /// Receiver that yields `true` while offline
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn is_offline(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.with_state(|s| s.consecutive_failures)
    }

    /// Apply an OS connectivity report. Returns the new state if it changed.
    pub fn set_os_connectivity(&self, online: bool) -> Option<bool> {
        let offline = self.with_state(|s| {
            s.os_offline = !online;
            if online {
                s.consecutive_failures = 0;
            }
            s.offline()
        });
        self.publish(offline)
    }

    /// Record an applied probe outcome. Returns the new state if it changed.
    pub fn record(&self, success: bool) -> Option<bool> {
        let offline = self.with_state(|s| {
            if success {
                s.consecutive_failures = 0;
                s.os_offline = false;
            } else {
                s.consecutive_failures = s.consecutive_failures.saturating_add(1);
            }
            s.offline()
        });
        self.publish(offline)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut DetectorState) -> T) -> T {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn publish(&self, offline: bool) -> Option<bool> {
        let changed = self.tx.send_if_modified(|current| {
            if *current != offline {
                *current = offline;
                true
            } else {
                false
            }
        });
        changed.then_some(offline)
    }
}
