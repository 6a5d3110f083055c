//! Pluggable reachability probes.
//!
//! A probe answers one question for one address: reachable or not, and at
//! what latency. Transport failures never escape a `Prober`; they degrade to
//! an unreachable outcome for that one address.

mod http;
mod ping;

pub use http::HttpProber;
pub use ping::PingProber;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Outcome of a single reachability check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeOutcome {
    pub reachable: bool,
    /// Round-trip time in milliseconds; 0.0 when unreachable.
    pub latency_ms: f64,
}

impl ProbeOutcome {
    pub fn up(latency_ms: f64) -> Self {
        Self {
            reachable: true,
            latency_ms,
        }
    }

    pub fn down() -> Self {
        Self {
            reachable: false,
            latency_ms: 0.0,
        }
    }
}

/// Probe transport errors. Internal to implementations: the `Prober`
/// contract converts them into an unreachable outcome.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("command failed: {0}")]
    Command(String),
}

/// A pluggable reachability check with a bounded internal timeout.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, address: &str) -> ProbeOutcome;
}

/// Sleep a random sub-100ms delay to avoid a thundering herd when a cycle
/// launches hundreds of probes at the same tick.
pub(crate) async fn start_jitter() {
    let jitter = rand::random::<u64>() % 100;
    tokio::time::sleep(Duration::from_millis(jitter)).await;
}
