//! Bounded latency history per target

use crate::models::Sample;

/// Samples older than this are dropped on every write
pub const RETENTION_MS: i64 = 24 * 60 * 60 * 1000;

/// Maximum number of samples kept per target
pub const HISTORY_CAPACITY: usize = 100;

/// Append a successful sample and enforce retention
pub fn append(history: &mut Vec<Sample>, now_ms: i64, latency_ms: f64) {
    history.push(Sample {
        timestamp_ms: now_ms,
        latency_ms,
    });
    prune(history, now_ms);
}

/// Drop expired samples and cap to the newest entries
pub fn prune(history: &mut Vec<Sample>, now_ms: i64) {
    let cutoff = now_ms - RETENTION_MS;
    history.retain(|s| s.timestamp_ms >= cutoff);

    if history.len() > HISTORY_CAPACITY {
        let excess = history.len() - HISTORY_CAPACITY;
        history.drain(..excess);
    }
}
