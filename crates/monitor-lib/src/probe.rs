//! Collaborator interfaces
//!
//! The engine only talks to the outside world through these traits. The
//! daemon crate supplies real implementations; tests supply mocks.

use anyhow::Result;

use crate::models::{LatencyThresholds, Level, Mode, NetworkTarget, Protocol, StoragePathTarget};

pub use async_trait::async_trait;

/// Measures reachability latency of a host
///
/// Timeouts are the executor's responsibility. The error message is
/// classified into a [`crate::error::ProbeErrorKind`] by substring.
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    async fn probe(&self, hostname: &str, port: u16, protocol: Protocol) -> Result<f64>;
}

/// Delivers user-visible alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> Result<()>;
}

/// Receives the aggregate network status after every batch
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish(&self, average_ms: f64, level: Level, thresholds: &LatencyThresholds) -> Result<()>;
}

/// Discovers storage file-share paths configured on the host
#[async_trait]
pub trait StoragePathSource: Send + Sync {
    async fn list_storage_paths(&self) -> Result<Vec<StoragePathTarget>>;
}

/// Supplies the network target set for a mode
#[async_trait]
pub trait TargetCatalog: Send + Sync {
    async fn targets_for_mode(&self, mode: Mode) -> Result<Vec<NetworkTarget>>;
}

/// Status sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStatusSink;

#[async_trait]
impl StatusSink for NullStatusSink {
    async fn publish(&self, _average_ms: f64, _level: Level, _thresholds: &LatencyThresholds) -> Result<()> {
        Ok(())
    }
}

/// Storage path source for hosts without storage containers
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStoragePaths;

#[async_trait]
impl StoragePathSource for NoStoragePaths {
    async fn list_storage_paths(&self) -> Result<Vec<StoragePathTarget>> {
        Ok(Vec::new())
    }
}
