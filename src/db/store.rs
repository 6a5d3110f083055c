//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::models::*;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("schema error: {0}")]
    Schema(String),
}

const TIME_FMT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Thread-safe database store.
///
/// Serves as both the endpoint registry and the sink for raw results and
/// window summaries. The connection is shared across concurrent probe tasks;
/// the mutex enforces serialization.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the database schema (embedded SQL).
    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("schema.sql"))
            .map_err(|e| DbError::Schema(format!("schema init failed: {}", e)))?;
        Ok(())
    }

    // --- Endpoint registry ---

    /// Add an endpoint to the registry and return its ID.
    pub fn add_endpoint(&self, endpoint: &mut Endpoint) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO endpoints (address, status_class, reason_class) VALUES (?1, ?2, ?3)",
            params![endpoint.address, endpoint.status_class, endpoint.reason_class],
        )?;
        let id = conn.last_insert_rowid();
        endpoint.id = id;
        Ok(id)
    }

    /// List all registered endpoints.
    pub fn list_endpoints(&self) -> Result<Vec<Endpoint>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, address, status_class, reason_class FROM endpoints ORDER BY id",
        )?;

        let endpoints = stmt
            .query_map([], |row| {
                Ok(Endpoint {
                    id: row.get(0)?,
                    address: row.get(1)?,
                    status_class: row.get(2)?,
                    reason_class: row.get(3)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(endpoints)
    }

    // --- Raw Results ---

    /// Store a batch of probe results through one prepared statement.
    ///
    /// A failed row is logged with endpoint context and skipped; it never
    /// aborts the rest of the batch. Returns the number of rows written.
    pub fn add_probe_records(&self, records: &[ProbeRecord]) -> Result<usize, DbError> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "INSERT INTO probe_results (endpoint_id, time, status, latency_ms, status_class, reason_class)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;

        let mut written = 0;
        for r in records {
            let status = if r.reachable { "1" } else { "0" };
            match stmt.execute(params![
                r.endpoint_id,
                r.time.format(TIME_FMT).to_string(),
                status,
                r.latency_ms,
                r.status_class,
                r.reason_class,
            ]) {
                Ok(_) => written += 1,
                Err(e) => {
                    tracing::error!(
                        endpoint_id = r.endpoint_id,
                        error = %e,
                        "failed to store probe result"
                    );
                }
            }
        }

        Ok(written)
    }

    /// Get all raw results for one endpoint, ordered by time.
    pub fn get_probe_records(&self, endpoint_id: i64) -> Result<Vec<ProbeRecord>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT endpoint_id, time, status, latency_ms, status_class, reason_class
             FROM probe_results WHERE endpoint_id = ?1 ORDER BY time ASC",
        )?;

        let records = stmt
            .query_map(params![endpoint_id], |row| {
                let time_str: String = row.get(1)?;
                let status: String = row.get(2)?;
                Ok(ProbeRecord {
                    endpoint_id: row.get(0)?,
                    time: parse_db_time(&time_str).unwrap_or_else(Utc::now),
                    reachable: status == "1",
                    latency_ms: row.get(3)?,
                    status_class: row.get(4)?,
                    reason_class: row.get(5)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(records)
    }

    /// Read raw results within `[start, end)` matching the inclusion filter,
    /// ordered by endpoint then time for reproducible aggregation.
    pub fn query_window_results(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: InclusionFilter,
    ) -> Result<Vec<WindowRow>, DbError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT endpoint_id, status, latency_ms FROM probe_results
             WHERE time >= ?1 AND time < ?2
               AND status_class = ?3
               AND reason_class != ?4
             ORDER BY endpoint_id, time",
        )?;

        let rows = stmt
            .query_map(
                params![
                    start.format(TIME_FMT).to_string(),
                    end.format(TIME_FMT).to_string(),
                    filter.include_status_class,
                    filter.exclude_reason_class,
                ],
                |row| {
                    let status: String = row.get(1)?;
                    Ok(WindowRow {
                        endpoint_id: row.get(0)?,
                        reachable: status == "1",
                        latency_ms: row.get(2)?,
                    })
                },
            )?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(rows)
    }

    // --- Window Summaries ---

    /// Upsert summaries for one window inside a single transaction.
    ///
    /// Either every row commits or none do; an error mid-batch rolls the
    /// whole window back so downstream readers never see a partial window.
    pub fn upsert_summaries(&self, summaries: &[WindowSummary]) -> Result<(), DbError> {
        if summaries.is_empty() {
            return Ok(());
        }

        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO window_summaries
                 (endpoint_id, window_start, success_count, fail_count, uptime_pct, median_latency_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(endpoint_id, window_start) DO UPDATE SET
                 success_count=excluded.success_count, fail_count=excluded.fail_count,
                 uptime_pct=excluded.uptime_pct, median_latency_ms=excluded.median_latency_ms",
            )?;

            for s in summaries {
                stmt.execute(params![
                    s.endpoint_id,
                    s.window_start.format(TIME_FMT).to_string(),
                    s.success_count,
                    s.fail_count,
                    s.uptime_pct,
                    s.median_latency_ms,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Get the summary row for one endpoint and window, if present.
    pub fn get_summary(
        &self,
        endpoint_id: i64,
        window_start: DateTime<Utc>,
    ) -> Result<Option<WindowSummary>, DbError> {
        let conn = self.conn.lock().unwrap();
        let summary = conn
            .query_row(
                "SELECT endpoint_id, window_start, success_count, fail_count, uptime_pct, median_latency_ms
                 FROM window_summaries WHERE endpoint_id = ?1 AND window_start = ?2",
                params![endpoint_id, window_start.format(TIME_FMT).to_string()],
                |row| {
                    let time_str: String = row.get(1)?;
                    Ok(WindowSummary {
                        endpoint_id: row.get(0)?,
                        window_start: parse_db_time(&time_str).unwrap_or_else(Utc::now),
                        success_count: row.get(2)?,
                        fail_count: row.get(3)?,
                        uptime_pct: row.get(4)?,
                        median_latency_ms: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }

    /// Count summary rows for one endpoint across all windows.
    pub fn count_summaries(&self, endpoint_id: i64) -> Result<i64, DbError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM window_summaries WHERE endpoint_id = ?1",
            params![endpoint_id],
            |r| r.get(0),
        )?)
    }
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        "%Y-%m-%d %H:%M:%S%.9f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}
