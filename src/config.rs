//! Configuration module.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file (default: "slamon.db")
    pub db_path: String,
    /// Probe transport: "ping" or "http" (default: "ping")
    pub probe_kind: String,
    /// Seconds between probe cycles (default: 5)
    pub probe_interval_secs: u64,
    /// Seconds between target registry refreshes (default: 5)
    pub refresh_interval_secs: u64,
    /// Maximum probes in flight at once (default: 300)
    pub probe_concurrency: usize,
    /// Per-probe timeout in seconds (default: 1)
    pub probe_timeout_secs: u64,
    /// Seconds between aggregation runs (default: 3600)
    pub aggregate_interval_secs: u64,
    /// Only aggregate results with this status class (default: 8)
    pub include_status_class: i64,
    /// Skip results with this reason class during aggregation (default: 16)
    pub exclude_reason_class: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: "slamon.db".to_string(),
            probe_kind: "ping".to_string(),
            probe_interval_secs: 5,
            refresh_interval_secs: 5,
            probe_concurrency: 300,
            probe_timeout_secs: 1,
            aggregate_interval_secs: 3600,
            include_status_class: 8,
            exclude_reason_class: 16,
        }
    }
}

impl Config {
    /// Load configuration from `SLAMON_*` environment variables.
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(path) = env::var("SLAMON_DB_PATH") {
            cfg.db_path = path;
        }

        if let Ok(kind) = env::var("SLAMON_PROBE_KIND") {
            cfg.probe_kind = kind;
        }

        env_parse("SLAMON_PROBE_INTERVAL_SECS", &mut cfg.probe_interval_secs);
        env_parse("SLAMON_REFRESH_INTERVAL_SECS", &mut cfg.refresh_interval_secs);
        env_parse("SLAMON_PROBE_CONCURRENCY", &mut cfg.probe_concurrency);
        env_parse("SLAMON_PROBE_TIMEOUT_SECS", &mut cfg.probe_timeout_secs);
        env_parse("SLAMON_AGGREGATE_INTERVAL_SECS", &mut cfg.aggregate_interval_secs);
        env_parse("SLAMON_INCLUDE_STATUS_CLASS", &mut cfg.include_status_class);
        env_parse("SLAMON_EXCLUDE_REASON_CLASS", &mut cfg.exclude_reason_class);

        cfg
    }
}

fn env_parse<T: FromStr>(key: &str, out: &mut T) {
    if let Ok(raw) = env::var(key) {
        if let Ok(value) = raw.parse() {
            *out = value;
        }
    }
}
