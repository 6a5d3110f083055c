//! HTTP probe implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{ProbeOutcome, Prober};

/// Reachability probe that issues an HTTP GET and reads the full body;
/// latency covers the complete transfer.
pub struct HttpProber {
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        super::start_jitter().await;

        let url = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };

        let client = match reqwest::Client::builder().timeout(self.timeout).build() {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(address, error = %e, "http client build failed");
                return ProbeOutcome::down();
            }
        };

        let start = Instant::now();

        let response = match client.get(&url).send().await {
            Ok(r) => r,
            Err(_) => return ProbeOutcome::down(),
        };

        match response.bytes().await {
            Ok(_) => ProbeOutcome::up(start.elapsed().as_secs_f64() * 1000.0),
            Err(_) => ProbeOutcome::down(),
        }
    }
}
