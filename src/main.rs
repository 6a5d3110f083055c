//! slamon - SLA reachability prober and window aggregator.
//!
//! Probes a fleet of endpoints on a fixed cadence with bounded concurrency,
//! stores raw results, and rolls them up hourly into per-endpoint
//! uptime/median-latency summaries.

mod config;
mod db;
mod probe;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use config::Config;
use db::{Endpoint, InclusionFilter, Store};
use probe::{HttpProber, PingProber, Prober};
use scheduler::{Aggregator, Scheduler};

use tokio::sync::{broadcast, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("slamon=info".parse()?),
        )
        .init();

    let cfg = Config::load();
    tracing::info!("Using database at {}", cfg.db_path);

    let store = Arc::new(Store::new(&cfg.db_path)?);

    let initial = bootstrap_targets(&store, Duration::from_secs(cfg.refresh_interval_secs)).await?;
    tracing::info!(count = initial.len(), "loaded initial target set");

    let (shutdown_tx, _) = broadcast::channel(1);
    let (targets_tx, targets_rx) = watch::channel(Arc::new(initial));

    tokio::spawn(scheduler::run_refresh_loop(
        store.clone(),
        targets_tx,
        Duration::from_secs(cfg.refresh_interval_secs),
        shutdown_tx.subscribe(),
    ));

    let filter = InclusionFilter {
        include_status_class: cfg.include_status_class,
        exclude_reason_class: cfg.exclude_reason_class,
    };
    let aggregator = Aggregator::new(
        store.clone(),
        filter,
        Duration::from_secs(cfg.aggregate_interval_secs),
    );
    aggregator.start(shutdown_tx.subscribe());

    let probe_timeout = Duration::from_secs(cfg.probe_timeout_secs);
    let prober: Arc<dyn Prober> = match cfg.probe_kind.as_str() {
        "http" => Arc::new(HttpProber::new(probe_timeout)),
        _ => Arc::new(PingProber::new(probe_timeout)),
    };
    let sched = Scheduler::new(
        store,
        prober,
        Duration::from_secs(cfg.probe_interval_secs),
        cfg.probe_concurrency,
        targets_rx,
    );
    let run = tokio::spawn(sched.run(shutdown_tx.subscribe()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, draining in-flight cycle");
    let _ = shutdown_tx.send(());
    let _ = run.await;

    Ok(())
}

/// Block until the registry yields a non-empty target set.
///
/// An empty-but-reachable registry is retried on the refresh cadence; a
/// query error at boot is the one condition that terminates the process.
async fn bootstrap_targets(
    store: &Store,
    retry: Duration,
) -> Result<Vec<Endpoint>, Box<dyn std::error::Error + Send + Sync>> {
    loop {
        let endpoints = store.list_endpoints()?;
        if !endpoints.is_empty() {
            return Ok(endpoints);
        }
        tracing::warn!("registry has no endpoints yet, retrying");
        tokio::time::sleep(retry).await;
    }
}
