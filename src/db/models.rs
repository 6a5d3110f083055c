//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A network endpoint to probe, as read from the registry.
///
/// `status_class` and `reason_class` are opaque classification tags supplied
/// by the registry; they are carried through to raw results unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: i64,
    pub address: String,
    pub status_class: i64,
    pub reason_class: i64,
}

/// A single raw probe result. Append-only.
#[derive(Debug, Clone)]
pub struct ProbeRecord {
    pub endpoint_id: i64,
    /// Probe completion time.
    pub time: DateTime<Utc>,
    pub reachable: bool,
    /// Round-trip time in milliseconds; 0.0 when unreachable.
    pub latency_ms: f64,
    pub status_class: i64,
    pub reason_class: i64,
}

/// A raw result row as read back for aggregation.
#[derive(Debug, Clone)]
pub struct WindowRow {
    pub endpoint_id: i64,
    pub reachable: bool,
    pub latency_ms: f64,
}

/// One summary row per endpoint per hour-aligned window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSummary {
    pub endpoint_id: i64,
    pub window_start: DateTime<Utc>,
    pub success_count: i64,
    pub fail_count: i64,
    pub uptime_pct: f64,
    pub median_latency_ms: f64,
}

/// Classification filter applied when reading raw results for aggregation.
/// A row qualifies when its `status_class` matches and its `reason_class`
/// does not.
#[derive(Debug, Clone, Copy)]
pub struct InclusionFilter {
    pub include_status_class: i64,
    pub exclude_reason_class: i64,
}
