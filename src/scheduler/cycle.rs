//! Bounded-concurrency probe cycle.
//!
//! One sweep probes every endpoint in the active set exactly once, with a
//! counting admission gate capping how many probes run at the same time. The
//! cycle is complete only when every probe has finished and its result has
//! been handed to the sink.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::db::{Endpoint, ProbeRecord, Store};
use crate::probe::Prober;

/// Sweep `targets` once with at most `cap` probes in flight, commit the
/// collected results, and return the cycle's wall-clock duration.
pub async fn run_cycle(
    targets: Arc<Vec<Endpoint>>,
    prober: Arc<dyn Prober>,
    store: Arc<Store>,
    cap: usize,
) -> Duration {
    let start = Instant::now();

    let gate = Arc::new(Semaphore::new(cap));
    let mut tasks: JoinSet<ProbeRecord> = JoinSet::new();

    for endpoint in targets.iter().cloned() {
        let gate = gate.clone();
        let prober = prober.clone();

        tasks.spawn(async move {
            // The gate is never closed while a cycle is running; a slot is
            // held for the full probe and released on completion either way.
            let Ok(_permit) = gate.acquire_owned().await else {
                return failed_record(&endpoint);
            };

            let outcome = prober.probe(&endpoint.address).await;
            ProbeRecord {
                endpoint_id: endpoint.id,
                time: Utc::now(),
                reachable: outcome.reachable,
                latency_ms: outcome.latency_ms,
                status_class: endpoint.status_class,
                reason_class: endpoint.reason_class,
            }
        });
    }

    let mut records = Vec::with_capacity(targets.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(record) => records.push(record),
            Err(e) => tracing::error!(error = %e, "probe task failed to join"),
        }
    }

    match store.add_probe_records(&records) {
        Ok(written) => {
            tracing::debug!(written, probed = records.len(), "probe cycle committed")
        }
        Err(e) => tracing::error!(error = %e, "failed to commit probe cycle results"),
    }

    start.elapsed()
}

fn failed_record(endpoint: &Endpoint) -> ProbeRecord {
    ProbeRecord {
        endpoint_id: endpoint.id,
        time: Utc::now(),
        reachable: false,
        latency_ms: 0.0,
        status_class: endpoint.status_class,
        reason_class: endpoint.reason_class,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;

    struct ScriptedProber;

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, address: &str) -> ProbeOutcome {
            match address {
                "10.0.0.1" => ProbeOutcome::up(12.5),
                _ => ProbeOutcome::down(),
            }
        }
    }

    /// Tracks how many probes are in flight at once.
    struct GaugeProber {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Prober for GaugeProber {
        async fn probe(&self, _address: &str) -> ProbeOutcome {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            ProbeOutcome::up(1.0)
        }
    }

    fn endpoint(id: i64, address: &str) -> Endpoint {
        Endpoint {
            id,
            address: address.to_string(),
            status_class: 8,
            reason_class: 1,
        }
    }

    fn open_store() -> (NamedTempFile, Arc<Store>) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        (tmp, store)
    }

    #[tokio::test]
    async fn test_cycle_persists_scripted_outcomes() {
        let (_tmp, store) = open_store();
        let targets = Arc::new(vec![endpoint(1, "10.0.0.1"), endpoint(2, "10.0.0.2")]);

        run_cycle(targets, Arc::new(ScriptedProber), store.clone(), 10).await;

        let recs = store.get_probe_records(1).unwrap();
        assert_eq!(recs.len(), 1);
        assert!(recs[0].reachable);
        assert_eq!(recs[0].latency_ms, 12.5);

        let recs = store.get_probe_records(2).unwrap();
        assert_eq!(recs.len(), 1);
        assert!(!recs[0].reachable);
        assert_eq!(recs[0].latency_ms, 0.0);
    }

    #[tokio::test]
    async fn test_cycle_probes_each_endpoint_once_within_cap() {
        let (_tmp, store) = open_store();
        let n = 40;
        let cap = 5;
        let targets: Vec<_> = (1..=n).map(|i| endpoint(i, "host")).collect();

        let prober = Arc::new(GaugeProber {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        run_cycle(Arc::new(targets), prober.clone(), store.clone(), cap).await;

        assert!(prober.peak.load(Ordering::SeqCst) <= cap);
        for id in 1..=n {
            assert_eq!(store.get_probe_records(id).unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_cycle_reports_elapsed() {
        let (_tmp, store) = open_store();
        let targets = Arc::new(vec![endpoint(1, "host")]);

        let prober = Arc::new(GaugeProber {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let elapsed = run_cycle(targets, prober, store, 1).await;
        assert!(elapsed >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_empty_target_set_is_a_noop() {
        let (_tmp, store) = open_store();
        let elapsed = run_cycle(Arc::new(Vec::new()), Arc::new(ScriptedProber), store, 10).await;
        assert!(elapsed < Duration::from_secs(1));
    }
}
