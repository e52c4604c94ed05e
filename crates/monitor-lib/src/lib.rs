//! Probe orchestration and alerting engine for the Pulsewatch latency monitor
//!
//! This crate provides:
//! - Latency classification and bounded per-target history
//! - Concurrent, single-flight probe batches per target class
//! - Deduplicated, rate-limited alert gates
//! - Offline detection, scheduling and persisted settings
//! - Health checks and observability

pub mod alert;
pub mod catalog;
pub mod error;
pub mod export;
pub mod health;
pub mod invoker;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod offline;
pub mod probe;
pub mod runner;
pub mod scheduler;
pub mod settings;
pub mod state;
pub mod status;

pub use error::{EngineError, ProbeErrorKind};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use monitor::{AlertSnapshot, EngineSnapshot, Monitor, MonitorBuilder};
pub use observability::{MonitorMetrics, StructuredLogger};
pub use status::TargetStatus;
