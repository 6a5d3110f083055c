//! Scheduler module: control loop, bounded probe cycles, target refresh,
//! and window aggregation.

mod aggregate;
mod cycle;
mod refresh;

pub use aggregate::*;
pub use cycle::*;
pub use refresh::*;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use crate::db::{Endpoint, Store};
use crate::probe::Prober;

/// The control loop driving probe cycles against the active target set.
///
/// Cycles run inline in the loop, so refresh publications and shutdown are
/// only observed between cycles: a target-set swap never lands mid-cycle,
/// and shutdown lets the in-flight cycle drain before returning.
pub struct Scheduler {
    store: Arc<Store>,
    prober: Arc<dyn Prober>,
    probe_interval: Duration,
    concurrency: usize,
    targets_rx: watch::Receiver<Arc<Vec<Endpoint>>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<Store>,
        prober: Arc<dyn Prober>,
        probe_interval: Duration,
        concurrency: usize,
        targets_rx: watch::Receiver<Arc<Vec<Endpoint>>>,
    ) -> Self {
        Self {
            store,
            prober,
            probe_interval,
            concurrency,
            targets_rx,
        }
    }

    /// Run probe cycles until shutdown.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.probe_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("scheduler stopping");
                    break;
                }
                changed = self.targets_rx.changed() => {
                    if changed.is_err() {
                        // Publisher gone; only happens during teardown.
                        tracing::debug!("target set publisher closed");
                        break;
                    }
                    let count = self.targets_rx.borrow_and_update().len();
                    tracing::info!(count, "active target set updated");
                }
                _ = ticker.tick() => {
                    // Snapshot the current set; the cycle iterates this Arc
                    // even if a refresh publishes a new one meanwhile.
                    let targets = self.targets_rx.borrow_and_update().clone();
                    let elapsed = run_cycle(
                        targets,
                        self.prober.clone(),
                        self.store.clone(),
                        self.concurrency,
                    )
                    .await;

                    if elapsed > self.probe_interval {
                        tracing::warn!(
                            elapsed_ms = elapsed.as_millis() as u64,
                            interval_ms = self.probe_interval.as_millis() as u64,
                            "probe cycle overran its interval"
                        );
                    }
                }
            }
        }
    }
}
