//! Target registry refresh.
//!
//! A background loop re-reads the registry on a fixed cadence and publishes
//! the snapshot over a watch channel. Publication is atomic: a probe cycle
//! already iterating an older `Arc` keeps it until the cycle finishes, and
//! the next cycle picks up the new one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use crate::db::{Endpoint, Store};

/// Query the registry once and publish the result if it is non-empty.
///
/// An empty result is treated as a registry hiccup and the previous set is
/// retained; so is a query error. Neither stops the loop.
pub fn refresh_once(store: &Store, targets_tx: &watch::Sender<Arc<Vec<Endpoint>>>) {
    match store.list_endpoints() {
        Ok(endpoints) if endpoints.is_empty() => {
            tracing::warn!("registry returned no endpoints, keeping previous target set");
        }
        Ok(endpoints) => {
            tracing::debug!(count = endpoints.len(), "refreshed target set");
            let _ = targets_tx.send(Arc::new(endpoints));
        }
        Err(e) => {
            tracing::error!(error = %e, "registry query failed, keeping previous target set");
        }
    }
}

/// Run the refresh loop until shutdown.
pub async fn run_refresh_loop(
    store: Arc<Store>,
    targets_tx: watch::Sender<Arc<Vec<Endpoint>>>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The immediate first tick would re-publish the bootstrap set.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => refresh_once(&store, &targets_tx),
        }
    }
}
