//! Latency classification against configured thresholds

use crate::models::{LatencyThresholds, Level};

/// Classify a latency reading.
///
/// Boundaries are inclusive and checked in order, so unordered thresholds
/// still yield a level: the first boundary the latency fits under wins.
pub fn classify(latency_ms: Option<f64>, thresholds: &LatencyThresholds) -> Level {
    let latency = match latency_ms {
        Some(v) if !v.is_nan() => v,
        _ => return Level::Unknown,
    };

    if latency <= thresholds.excellent {
        Level::Excellent
    } else if latency <= thresholds.good {
        Level::Good
    } else if latency <= thresholds.warning {
        Level::Warning
    } else {
        Level::Critical
    }
}
