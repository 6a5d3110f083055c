//! Hourly window aggregation.
//!
//! Rolls raw probe results inside one closed hour window into a summary per
//! endpoint: success/fail counts, uptime percentage, and the median latency.
//! Failed probes contribute their stored zero latency to the median, so the
//! median never disagrees with the counts about how many samples a window
//! had. All window math is in UTC.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::broadcast;

use crate::db::{DbError, InclusionFilter, Store, WindowSummary};

/// Window length. Summaries are keyed on hour-aligned window starts.
pub const WINDOW_SECS: i64 = 3600;

/// How many closed windows each aggregation tick re-walks, so a delayed
/// tick or short downtime cannot leave an hour unsummarized.
const CATCHUP_WINDOWS: i64 = 3;

/// Median of a sample set: sort ascending; odd count takes the middle value,
/// even count the mean of the two middle values; empty is 0.
pub fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Uptime percentage over a window: `100 * success / total`, 0 when the
/// window had no samples.
pub fn uptime_pct(success_count: i64, fail_count: i64) -> f64 {
    let total = success_count + fail_count;
    if total == 0 {
        return 0.0;
    }
    (success_count as f64 / total as f64) * 100.0
}

/// Truncate a datetime to the start of its containing hour window.
pub fn window_start_for(dt: DateTime<Utc>) -> DateTime<Utc> {
    let ts = dt.timestamp();
    let truncated = ts - ts.rem_euclid(WINDOW_SECS);
    DateTime::from_timestamp(truncated, 0).unwrap_or(dt)
}

/// Aggregate one closed window `[window_start, window_start + 1h)` and
/// upsert its summaries in a single transaction.
///
/// Endpoints with no qualifying raw result produce no row. Recomputing from
/// unchanged inputs yields identical rows; a persistence error rolls the
/// whole window back. Returns the number of summary rows written.
pub fn aggregate_window(
    store: &Store,
    window_start: DateTime<Utc>,
    filter: InclusionFilter,
) -> Result<usize, DbError> {
    let window_end = window_start + ChronoDuration::seconds(WINDOW_SECS);
    let rows = store.query_window_results(window_start, window_end, filter)?;

    // BTreeMap keeps endpoint order deterministic.
    let mut latencies: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    let mut counts: BTreeMap<i64, (i64, i64)> = BTreeMap::new();

    for row in rows {
        latencies
            .entry(row.endpoint_id)
            .or_default()
            .push(row.latency_ms);
        let entry = counts.entry(row.endpoint_id).or_default();
        if row.reachable {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
    }

    let mut summaries = Vec::with_capacity(latencies.len());
    for (endpoint_id, mut values) in latencies {
        let (success_count, fail_count) = counts[&endpoint_id];
        summaries.push(WindowSummary {
            endpoint_id,
            window_start,
            success_count,
            fail_count,
            uptime_pct: uptime_pct(success_count, fail_count),
            median_latency_ms: median(&mut values),
        });
    }

    store.upsert_summaries(&summaries)?;
    Ok(summaries.len())
}

/// Background manager that rolls up the most recently closed window on a
/// fixed cadence. Re-runs are idempotent by the summary upsert key.
pub struct Aggregator {
    store: Arc<Store>,
    filter: InclusionFilter,
    interval: Duration,
}

impl Aggregator {
    pub fn new(store: Arc<Store>, filter: InclusionFilter, interval: Duration) -> Self {
        Self {
            store,
            filter,
            interval,
        }
    }

    /// Spawn the aggregation task; it runs until shutdown.
    pub fn start(&self, mut shutdown: broadcast::Receiver<()>) {
        let store = self.store.clone();
        let filter = self.filter;
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {
                        // Re-running older windows is idempotent by the
                        // summary upsert key.
                        let latest_closed =
                            window_start_for(Utc::now()) - ChronoDuration::seconds(WINDOW_SECS);
                        for back in (0..CATCHUP_WINDOWS).rev() {
                            let window_start =
                                latest_closed - ChronoDuration::seconds(WINDOW_SECS * back);
                            match aggregate_window(&store, window_start, filter) {
                                Ok(rows) => tracing::info!(
                                    rows,
                                    window_start = %window_start,
                                    "aggregated window"
                                ),
                                Err(e) => tracing::error!(
                                    error = %e,
                                    window_start = %window_start,
                                    "window aggregation failed, summaries rolled back"
                                ),
                            }
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ProbeRecord;
    use chrono::TimeZone;
    use tempfile::NamedTempFile;

    const FILTER: InclusionFilter = InclusionFilter {
        include_status_class: 8,
        exclude_reason_class: 16,
    };

    fn open_store() -> (NamedTempFile, Store) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        (tmp, store)
    }

    fn record(
        endpoint_id: i64,
        time: DateTime<Utc>,
        reachable: bool,
        latency_ms: f64,
    ) -> ProbeRecord {
        ProbeRecord {
            endpoint_id,
            time,
            reachable,
            latency_ms,
            status_class: 8,
            reason_class: 1,
        }
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut []), 0.0);
        assert_eq!(median(&mut [5.0]), 5.0);
        assert_eq!(median(&mut [1.0, 3.0]), 2.0);
        assert_eq!(median(&mut [1.0, 2.0, 3.0]), 2.0);
        assert_eq!(median(&mut [4.0, 2.0, 1.0, 3.0]), 2.5);
    }

    #[test]
    fn test_uptime_pct() {
        assert_eq!(uptime_pct(7, 3), 70.0);
        assert_eq!(uptime_pct(0, 0), 0.0);
        assert_eq!(uptime_pct(0, 5), 0.0);
        assert_eq!(uptime_pct(5, 0), 100.0);
    }

    #[test]
    fn test_window_start_for() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 12, 34, 56).unwrap();
        assert_eq!(
            window_start_for(dt),
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
        );

        let aligned = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(window_start_for(aligned), aligned);
    }

    #[test]
    fn test_aggregate_window_counts_and_median() {
        let (_tmp, store) = open_store();
        let window = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

        store
            .add_probe_records(&[
                record(1, window + ChronoDuration::minutes(1), true, 10.0),
                record(1, window + ChronoDuration::minutes(2), true, 20.0),
                record(1, window + ChronoDuration::minutes(3), false, 0.0),
            ])
            .unwrap();

        let written = aggregate_window(&store, window, FILTER).unwrap();
        assert_eq!(written, 1);

        let summary = store.get_summary(1, window).unwrap().unwrap();
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.fail_count, 1);
        assert!((summary.uptime_pct - 200.0 / 3.0).abs() < 1e-9);
        // Median of [0, 10, 20]: the failed probe's zero sample counts.
        assert_eq!(summary.median_latency_ms, 10.0);
    }

    #[test]
    fn test_aggregate_window_is_idempotent() {
        let (_tmp, store) = open_store();
        let window = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

        store
            .add_probe_records(&[
                record(1, window + ChronoDuration::minutes(1), true, 15.0),
                record(1, window + ChronoDuration::minutes(2), false, 0.0),
            ])
            .unwrap();

        aggregate_window(&store, window, FILTER).unwrap();
        let first = store.get_summary(1, window).unwrap().unwrap();

        aggregate_window(&store, window, FILTER).unwrap();
        let second = store.get_summary(1, window).unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(store.count_summaries(1).unwrap(), 1);
    }

    #[test]
    fn test_failed_window_write_leaves_no_partial_summaries() {
        let (tmp, store) = open_store();
        let window = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

        store
            .add_probe_records(&[
                record(1, window + ChronoDuration::minutes(1), true, 10.0),
                record(2, window + ChronoDuration::minutes(2), true, 20.0),
            ])
            .unwrap();

        // Fail the write for endpoint 2 so the window's batch cannot commit.
        let side = rusqlite::Connection::open(tmp.path()).unwrap();
        side.execute_batch(
            "CREATE TRIGGER reject_endpoint_two BEFORE INSERT ON window_summaries
             WHEN NEW.endpoint_id = 2
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

        assert!(aggregate_window(&store, window, FILTER).is_err());

        // Neither endpoint's summary is visible: the window rolled back whole.
        assert!(store.get_summary(1, window).unwrap().is_none());
        assert!(store.get_summary(2, window).unwrap().is_none());
    }

    #[test]
    fn test_no_qualifying_results_produces_no_row() {
        let (_tmp, store) = open_store();
        let window = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

        // One row outside the window, one excluded by reason class.
        let mut maintenance = record(1, window + ChronoDuration::minutes(5), true, 9.0);
        maintenance.reason_class = 16;
        store
            .add_probe_records(&[
                record(1, window - ChronoDuration::minutes(1), true, 5.0),
                maintenance,
            ])
            .unwrap();

        let written = aggregate_window(&store, window, FILTER).unwrap();
        assert_eq!(written, 0);
        assert!(store.get_summary(1, window).unwrap().is_none());
    }

    #[test]
    fn test_orphaned_endpoint_still_gets_a_row() {
        let (_tmp, store) = open_store();
        let window = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

        // Endpoint 42 was removed from the registry but left raw results.
        store
            .add_probe_records(&[record(42, window + ChronoDuration::minutes(1), true, 7.0)])
            .unwrap();

        aggregate_window(&store, window, FILTER).unwrap();
        let summary = store.get_summary(42, window).unwrap().unwrap();
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.uptime_pct, 100.0);
        assert_eq!(summary.median_latency_ms, 7.0);
    }

    #[test]
    fn test_multiple_endpoints_one_row_each() {
        let (_tmp, store) = open_store();
        let window = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

        store
            .add_probe_records(&[
                record(1, window + ChronoDuration::minutes(1), true, 10.0),
                record(2, window + ChronoDuration::minutes(1), false, 0.0),
                record(2, window + ChronoDuration::minutes(2), false, 0.0),
            ])
            .unwrap();

        let written = aggregate_window(&store, window, FILTER).unwrap();
        assert_eq!(written, 2);

        let one = store.get_summary(1, window).unwrap().unwrap();
        assert_eq!(one.uptime_pct, 100.0);

        let two = store.get_summary(2, window).unwrap().unwrap();
        assert_eq!(two.success_count, 0);
        assert_eq!(two.fail_count, 2);
        assert_eq!(two.uptime_pct, 0.0);
        assert_eq!(two.median_latency_ms, 0.0);
    }
}
