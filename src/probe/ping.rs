//! Ping probe over the system `ping` binary.
//!
//! The command carries its own one-packet timeout; an outer tokio timeout
//! guards against a wedged binary so a probe can never block a cycle
//! indefinitely.

use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use super::{ProbeError, ProbeOutcome, Prober};

/// Reachability probe that shells out to `ping(8)`.
pub struct PingProber {
    timeout: Duration,
}

impl PingProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        super::start_jitter().await;

        match run_ping_command(address, self.timeout).await {
            Ok(latency_ms) => ProbeOutcome::up(latency_ms),
            Err(ProbeError::Timeout(_)) => ProbeOutcome::down(),
            Err(e) => {
                tracing::debug!(address, error = %e, "ping transport error");
                ProbeOutcome::down()
            }
        }
    }
}

/// Run one ping and return the round-trip time in milliseconds.
async fn run_ping_command(address: &str, timeout: Duration) -> Result<f64, ProbeError> {
    let timeout_secs = timeout.as_secs().max(1);

    let mut cmd = Command::new("ping");
    if cfg!(windows) {
        cmd.args(["-n", "1", "-w", &(timeout_secs * 1000).to_string(), address]);
    } else {
        cmd.args(["-c", "1", "-W", &timeout_secs.to_string(), address]);
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    // Grace margin over the command's own timeout.
    let output = tokio::time::timeout(timeout + Duration::from_millis(500), cmd.output())
        .await
        .map_err(|_| ProbeError::Timeout(timeout))?
        .map_err(|e| ProbeError::Command(format!("failed to execute ping: {}", e)))?;

    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.contains("100% packet loss") || stdout.contains("100.0% packet loss") {
            return Err(ProbeError::Timeout(timeout));
        }
        return Err(ProbeError::Network(format!(
            "ping exited with {}",
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_ping_output(&stdout))
}

/// Extract the round-trip time in milliseconds from ping output.
///
/// Unparsable output from a ping that exited successfully still counts as
/// reachable, with latency 0.
fn parse_ping_output(output: &str) -> f64 {
    // Per-packet line "time=12.3 ms" (Linux) or "time<1ms" (Windows).
    static PER_PACKET: OnceLock<Regex> = OnceLock::new();
    let per_packet =
        PER_PACKET.get_or_init(|| Regex::new(r"time[=<]\s*([0-9.]+)\s*ms").unwrap());
    if let Some(caps) = per_packet.captures(output) {
        if let Ok(ms) = caps[1].parse::<f64>() {
            return ms;
        }
    }

    // Summary line "min/avg/max/stddev = a/b/c/d ms" (macOS uses stddev,
    // Linux mdev); take the average.
    static SUMMARY: OnceLock<Regex> = OnceLock::new();
    let summary = SUMMARY
        .get_or_init(|| Regex::new(r"min/avg/max/(?:stddev|mdev)\s*=\s*[0-9.]+/([0-9.]+)/").unwrap());
    if let Some(caps) = summary.captures(output) {
        if let Ok(ms) = caps[1].parse::<f64>() {
            return ms;
        }
    }

    0.0
}
