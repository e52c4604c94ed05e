//! Shared engine state
//!
//! One [`EngineState`] per monitor, passed around as `Arc<EngineState>`.
//! Locks guarding it are never held across an `.await` on a collaborator.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::alert::AlertState;
use crate::models::{Config, TargetClass, TargetOverride};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::offline::OfflineDetector;
use crate::status::StatusStore;

/// Source of wall-clock time in milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock moved by hand, for tests and replay
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) -> i64 {
        self.now.fetch_add(delta_ms, Ordering::SeqCst) + delta_ms
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Single-flight slot for one target class.
///
/// Holds the target generation of the batch in flight. A new batch is
/// refused only when one for the same generation is running, so replacing
/// the target set never waits on a stale batch.
#[derive(Debug)]
pub struct InFlight {
    slot: AtomicU64,
}

impl InFlight {
    const IDLE: u64 = u64::MAX;

    pub fn new() -> Self {
        Self {
            slot: AtomicU64::new(Self::IDLE),
        }
    }

    pub fn try_acquire(&self, generation: u64) -> bool {
        let mut current = self.slot.load(Ordering::SeqCst);
        loop {
            if current == generation {
                return false;
            }
            match self
                .slot
                .compare_exchange(current, generation, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Release only if the slot still belongs to `generation`
    pub fn release(&self, generation: u64) -> bool {
        self.slot
            .compare_exchange(generation, Self::IDLE, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_busy(&self) -> bool {
        self.slot.load(Ordering::SeqCst) != Self::IDLE
    }
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-class mutable state
pub struct ClassState {
    pub store: StatusStore,
    pub in_flight: InFlight,
    batch_seq: AtomicU64,
}

impl ClassState {
    fn new() -> Self {
        Self {
            store: StatusStore::new(),
            in_flight: InFlight::new(),
            batch_seq: AtomicU64::new(0),
        }
    }

    /// Allocate the sequence number of a completed batch
    pub fn next_batch_seq(&self) -> u64 {
        self.batch_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn last_batch_seq(&self) -> u64 {
        self.batch_seq.load(Ordering::SeqCst)
    }
}

pub struct EngineState {
    config: RwLock<Arc<Config>>,
    network: ClassState,
    storage: ClassState,
    pub network_alert: Mutex<AlertState>,
    pub storage_alerts: DashMap<String, AlertState>,
    pub offline: OfflineDetector,
    pub target_overrides: RwLock<HashMap<String, TargetOverride>>,
    pub storage_muted: RwLock<HashSet<String>>,
    paused: AtomicBool,
    pub clock: Arc<dyn Clock>,
    pub metrics: MonitorMetrics,
    pub logger: StructuredLogger,
}

impl EngineState {
    pub fn new(config: Config, clock: Arc<dyn Clock>, node_name: impl Into<String>) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            network: ClassState::new(),
            storage: ClassState::new(),
            network_alert: Mutex::new(AlertState::new()),
            storage_alerts: DashMap::new(),
            offline: OfflineDetector::new(),
            target_overrides: RwLock::new(HashMap::new()),
            storage_muted: RwLock::new(HashSet::new()),
            paused: AtomicBool::new(false),
            clock,
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new(node_name),
        }
    }

    pub async fn config(&self) -> Arc<Config> {
        self.config.read().await.clone()
    }

    /// Swap in a new config, returning the previous one
    pub async fn swap_config(&self, config: Config) -> Arc<Config> {
        let mut guard = self.config.write().await;
        std::mem::replace(&mut *guard, Arc::new(config))
    }

    pub fn class(&self, class: TargetClass) -> &ClassState {
        match class {
            TargetClass::Network => &self.network,
            TargetClass::Storage => &self.storage,
        }
    }

    pub fn store(&self, class: TargetClass) -> &StatusStore {
        &self.class(class).store
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) -> bool {
        self.paused.swap(paused, Ordering::SeqCst)
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_same_generation_refused() {
        let slot = InFlight::new();
        assert!(slot.try_acquire(1));
        assert!(!slot.try_acquire(1));
        assert!(slot.is_busy());
    }

    #[test]
    fn test_in_flight_newer_generation_takes_over() {
        let slot = InFlight::new();
        assert!(slot.try_acquire(1));
        assert!(slot.try_acquire(2));

        // Stale batch finishing must not free the newer batch's slot
        assert!(!slot.release(1));
        assert!(slot.is_busy());
        assert!(slot.release(2));
        assert!(!slot.is_busy());
    }

    #[test]
    fn test_batch_seq_increments_per_class() {
        let state = EngineState::new(Config::default(), Arc::new(SystemClock), "test");
        assert_eq!(state.class(TargetClass::Network).next_batch_seq(), 1);
        assert_eq!(state.class(TargetClass::Network).next_batch_seq(), 2);
        assert_eq!(state.class(TargetClass::Storage).next_batch_seq(), 1);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.advance(500), 1_500);
        assert_eq!(clock.now_ms(), 1_500);
    }
}
