//! # Ferrobars Warehouse
//!
//! DuckDB-backed merge store for daily OHLCV bars and their EMA indicators.
//!
//! ## Overview
//!
//! The warehouse owns every persisted row. Rows are keyed by
//! `(symbol, timestamp)` and written in per-batch transactions:
//!
//! 1. the batch is staged in a temporary table,
//! 2. every stored row whose key appears in the stage is deleted,
//! 3. the staged rows are inserted,
//!
//! all inside one transaction, so readers see either the old rows or the new
//! ones and re-running a batch never duplicates history.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferrobars_warehouse::{PriceBar, Warehouse, WarehouseConfig};
//! use time::macros::datetime;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open(WarehouseConfig::default())?;
//!     let bar = PriceBar::new("SPY", datetime!(2024-06-28 00:00:00), 1.0, 2.0, 0.5, 1.5, 100)
//!         .with_ema(8, 1.5)
//!         .with_ema(21, 1.5)
//!         .with_ema(50, 1.5);
//!     warehouse.upsert(&[bar])?;
//!
//!     let rows = warehouse.query_by_symbol("SPY")?;
//!     println!("stored {} rows", rows.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `ohlcv` | Daily bars with `ema8`, `ema21`, `ema50` |
//! | `ingest_log` | Per-symbol outcome of each ingestion run |
//! | `schema_migrations` | Applied migration versions |

pub mod duckdb;
pub mod migrations;
pub mod models;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, ToSql};
use thiserror::Error;
use time::PrimitiveDateTime;
use tracing::debug;

pub use self::duckdb::{DuckDbConnectionManager, PooledConnection};
pub use self::models::{
    ema_field, format_timestamp, parse_timestamp, truncate_to_second, IngestLogEntry,
    IngestStatus, PriceBar, STORED_EMA_WINDOWS,
};

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A row cannot be stored or a stored row cannot be read back.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A pool mutex was poisoned by a panic in another thread.
    #[error("connection pool is poisoned")]
    PoolPoisoned,
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data").join("market.duckdb"),
            max_pool_size: 4,
        }
    }
}

impl WarehouseConfig {
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }
}

const OHLCV_COLUMNS: &str =
    r#""timestamp", open, high, low, close, volume, symbol, ema8, ema21, ema50"#;

/// The merge store for canonical price bars.
#[derive(Clone)]
pub struct Warehouse {
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open (creating if needed) the warehouse described by `config`.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = DuckDbConnectionManager::open(config.db_path, config.max_pool_size)?;
        let warehouse = Self { manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Create the schema if it is absent. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Get the path to the database file.
    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Replace every stored row whose `(symbol, timestamp)` appears in `batch`,
    /// then insert the batch. Returns the number of rows written.
    ///
    /// The whole batch commits or rolls back as one unit. Rows sharing a key
    /// inside the batch collapse to the last occurrence. Every row must carry a
    /// value for each of [`STORED_EMA_WINDOWS`].
    pub fn upsert(&self, batch: &[PriceBar]) -> Result<usize, WarehouseError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let rows = collapse_duplicate_keys(batch);
        let staged = rows
            .iter()
            .map(|row| StagedRow::from_bar(row))
            .collect::<Result<Vec<_>, _>>()?;

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            connection.execute_batch(
                r#"
CREATE OR REPLACE TEMP TABLE ohlcv_stage (
    "timestamp" TIMESTAMP NOT NULL,
    open DOUBLE NOT NULL,
    high DOUBLE NOT NULL,
    low DOUBLE NOT NULL,
    close DOUBLE NOT NULL,
    volume BIGINT NOT NULL,
    symbol TEXT NOT NULL,
    ema8 DOUBLE NOT NULL,
    ema21 DOUBLE NOT NULL,
    ema50 DOUBLE NOT NULL
);
"#,
            )?;

            {
                let insert_sql = format!(
                    "INSERT INTO ohlcv_stage ({OHLCV_COLUMNS}) \
                     VALUES (CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                );
                let mut statement = connection.prepare(insert_sql.as_str())?;
                for row in &staged {
                    let params: [&dyn ToSql; 10] = [
                        &row.timestamp,
                        &row.open,
                        &row.high,
                        &row.low,
                        &row.close,
                        &row.volume,
                        &row.symbol,
                        &row.emas[0],
                        &row.emas[1],
                        &row.emas[2],
                    ];
                    statement.execute(params.as_slice())?;
                }
            }

            let deleted = connection.execute(
                r#"DELETE FROM ohlcv USING ohlcv_stage AS stage
                   WHERE ohlcv.symbol = stage.symbol AND ohlcv."timestamp" = stage."timestamp""#,
                [],
            )?;
            let inserted = connection.execute(
                format!("INSERT INTO ohlcv ({OHLCV_COLUMNS}) SELECT {OHLCV_COLUMNS} FROM ohlcv_stage")
                    .as_str(),
                [],
            )?;
            connection.execute_batch("DROP TABLE ohlcv_stage")?;

            debug!(deleted, inserted, "merged ohlcv batch");
            Ok(inserted)
        })();

        finalize_transaction(&connection, result)
    }

    /// All stored rows for `symbol`, ascending by timestamp. Unknown symbols
    /// yield an empty vector.
    pub fn query_by_symbol(&self, symbol: &str) -> Result<Vec<PriceBar>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            r#"SELECT strftime("timestamp", '%Y-%m-%d %H:%M:%S'), open, high, low, close, volume,
                      symbol, ema8, ema21, ema50
               FROM ohlcv
               WHERE symbol = ?
               ORDER BY "timestamp""#,
        )?;

        let mut cursor = statement.query([symbol])?;
        let mut bars = Vec::new();
        while let Some(row) = cursor.next()? {
            let timestamp: String = row.get(0)?;
            let volume: i64 = row.get(5)?;
            let volume = u64::try_from(volume).map_err(|_| {
                WarehouseError::InvalidData(format!("negative volume {volume} at {timestamp}"))
            })?;

            let mut bar = PriceBar::new(
                row.get::<_, String>(6)?,
                parse_timestamp(&timestamp)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                volume,
            );
            for (offset, window) in STORED_EMA_WINDOWS.iter().enumerate() {
                if let Some(value) = row.get::<_, Option<f64>>(7 + offset)? {
                    bar.set_ema(*window, value);
                }
            }
            bars.push(bar);
        }

        Ok(bars)
    }

    /// Most recent stored timestamp for `symbol`, if any.
    pub fn latest_timestamp(
        &self,
        symbol: &str,
    ) -> Result<Option<PrimitiveDateTime>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let latest: Option<String> = connection.query_row(
            r#"SELECT strftime(MAX("timestamp"), '%Y-%m-%d %H:%M:%S') FROM ohlcv WHERE symbol = ?"#,
            [symbol],
            |row| row.get(0),
        )?;
        latest.as_deref().map(parse_timestamp).transpose()
    }

    /// Number of stored rows for `symbol`.
    pub fn row_count(&self, symbol: &str) -> Result<u64, WarehouseError> {
        let connection = self.manager.acquire()?;
        let count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM ohlcv WHERE symbol = ?",
            [symbol],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Distinct stored symbols in ascending order.
    pub fn symbols(&self) -> Result<Vec<String>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare("SELECT DISTINCT symbol FROM ohlcv ORDER BY symbol")?;
        let symbols = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(symbols)
    }

    /// Append audit entries for an ingestion run.
    pub fn record_ingest(&self, entries: &[IngestLogEntry]) -> Result<(), WarehouseError> {
        if entries.is_empty() {
            return Ok(());
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            let mut statement = connection.prepare(
                "INSERT INTO ingest_log (run_id, symbol, status, rows, detail, logged_at) \
                 VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
            )?;
            for entry in entries {
                let rows = i64::try_from(entry.rows).unwrap_or(i64::MAX);
                let params: [&dyn ToSql; 5] = [
                    &entry.run_id,
                    &entry.symbol,
                    &entry.status.as_str(),
                    &rows,
                    &entry.detail,
                ];
                statement.execute(params.as_slice())?;
            }
            Ok(())
        })();

        finalize_transaction(&connection, result)
    }

    /// Audit entries of one run, in symbol order.
    pub fn ingest_log(&self, run_id: &str) -> Result<Vec<IngestLogEntry>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT run_id, symbol, status, rows, detail FROM ingest_log \
             WHERE run_id = ? ORDER BY symbol",
        )?;

        let mut cursor = statement.query([run_id])?;
        let mut entries = Vec::new();
        while let Some(row) = cursor.next()? {
            let status: String = row.get(2)?;
            let rows: i64 = row.get(3)?;
            entries.push(IngestLogEntry {
                run_id: row.get(0)?,
                symbol: row.get(1)?,
                status: status.parse()?,
                rows: rows.max(0) as u64,
                detail: row.get(4)?,
            });
        }

        Ok(entries)
    }
}

/// A bar flattened into bindable SQL parameters.
struct StagedRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
    symbol: String,
    emas: [f64; 3],
}

impl StagedRow {
    fn from_bar(bar: &PriceBar) -> Result<Self, WarehouseError> {
        let timestamp = format_timestamp(bar.timestamp);
        let volume = i64::try_from(bar.volume).map_err(|_| {
            WarehouseError::InvalidData(format!(
                "{} {timestamp}: volume {} exceeds BIGINT",
                bar.symbol, bar.volume
            ))
        })?;

        let mut emas = [0.0; 3];
        for (slot, window) in emas.iter_mut().zip(STORED_EMA_WINDOWS) {
            *slot = bar
                .ema(window)
                .filter(|value| value.is_finite())
                .ok_or_else(|| {
                    WarehouseError::InvalidData(format!(
                        "{} {timestamp}: missing {}",
                        bar.symbol,
                        ema_field(window)
                    ))
                })?;
        }

        Ok(Self {
            timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume,
            symbol: bar.symbol.clone(),
            emas,
        })
    }
}

/// Keep the last occurrence of each `(symbol, timestamp)` key, preserving the
/// order of first appearance. Keys compare at whole-second precision.
fn collapse_duplicate_keys(batch: &[PriceBar]) -> Vec<&PriceBar> {
    let mut positions: HashMap<(&str, PrimitiveDateTime), usize> = HashMap::new();
    let mut rows: Vec<&PriceBar> = Vec::with_capacity(batch.len());
    for bar in batch {
        let key = (bar.symbol.as_str(), truncate_to_second(bar.timestamp));
        match positions.get(&key) {
            Some(&index) => rows[index] = bar,
            None => {
                positions.insert(key, rows.len());
                rows.push(bar);
            }
        }
    }
    rows
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use time::macros::datetime;

    fn bar(symbol: &str, ts: PrimitiveDateTime, close: f64) -> PriceBar {
        PriceBar::new(symbol, ts, close, close + 1.0, close - 1.0, close, 1_000)
            .with_ema(8, close)
            .with_ema(21, close)
            .with_ema(50, close)
    }

    #[test]
    fn initializes_schema_under_missing_parent_directory() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("nested").join("data").join("market.duckdb");

        let warehouse = Warehouse::open(WarehouseConfig::at(&db_path)).expect("open");
        assert_eq!(warehouse.db_path(), db_path.as_path());
        assert!(warehouse.query_by_symbol("SPY").expect("query").is_empty());

        drop(warehouse);
        let reopened = Warehouse::open(WarehouseConfig::at(&db_path)).expect("reopen");
        assert!(reopened.symbols().expect("symbols").is_empty());
    }

    #[test]
    fn collapses_duplicate_keys_inside_a_batch() {
        let temp = tempdir().expect("tempdir");
        let warehouse =
            Warehouse::open(WarehouseConfig::at(temp.path().join("w.duckdb"))).expect("open");
        let ts = datetime!(2024-01-02 00:00:00);

        let written = warehouse
            .upsert(&[bar("SPY", ts, 10.0), bar("SPY", ts, 11.0)])
            .expect("upsert");

        assert_eq!(written, 1);
        let rows = warehouse.query_by_symbol("SPY").expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].close, 11.0);
    }

    #[test]
    fn sub_second_timestamps_share_one_stored_key() {
        let temp = tempdir().expect("tempdir");
        let warehouse =
            Warehouse::open(WarehouseConfig::at(temp.path().join("w.duckdb"))).expect("open");
        let mut first = bar("SPY", datetime!(2024-01-02 10:00:00), 10.0);
        first.timestamp = datetime!(2024-01-02 10:00:00.1);
        let mut second = bar("SPY", datetime!(2024-01-02 10:00:00), 11.0);
        second.timestamp = datetime!(2024-01-02 10:00:00.2);

        let written = warehouse.upsert(&[first, second]).expect("upsert");

        assert_eq!(written, 1);
        let rows = warehouse.query_by_symbol("SPY").expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].timestamp, datetime!(2024-01-02 10:00:00));
        assert_eq!(rows[0].close, 11.0);

        // a later batch at another sub-second offset replaces the same row
        let mut replacement = bar("SPY", datetime!(2024-01-02 10:00:00), 12.0);
        replacement.timestamp = datetime!(2024-01-02 10:00:00.9);
        warehouse.upsert(&[replacement]).expect("replace");

        assert_eq!(warehouse.row_count("SPY").expect("count"), 1);
        assert_eq!(warehouse.query_by_symbol("SPY").expect("query")[0].close, 12.0);
    }

    #[test]
    fn rejects_rows_without_stored_indicator_values_and_keeps_prior_state() {
        let temp = tempdir().expect("tempdir");
        let warehouse =
            Warehouse::open(WarehouseConfig::at(temp.path().join("w.duckdb"))).expect("open");
        let ts = datetime!(2024-01-02 00:00:00);
        warehouse.upsert(&[bar("SPY", ts, 10.0)]).expect("seed");

        let mut incomplete = bar("SPY", ts, 12.0);
        incomplete.emas.remove(&50);
        let error = warehouse.upsert(&[incomplete]).expect_err("must reject");

        assert!(matches!(error, WarehouseError::InvalidData(ref message) if message.contains("ema50")));
        let rows = warehouse.query_by_symbol("SPY").expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].close, 10.0);
    }

    #[test]
    fn symbol_values_are_bound_as_parameters() {
        let temp = tempdir().expect("tempdir");
        let warehouse =
            Warehouse::open(WarehouseConfig::at(temp.path().join("w.duckdb"))).expect("open");
        let dangerous = r#"SPY'; DROP TABLE ohlcv; --"#;

        warehouse
            .upsert(&[bar(dangerous, datetime!(2024-01-02 00:00:00), 5.0)])
            .expect("upsert");

        assert_eq!(warehouse.row_count(dangerous).expect("count"), 1);
        assert_eq!(warehouse.symbols().expect("symbols"), vec![dangerous.to_string()]);
    }

    #[test]
    fn latest_timestamp_tracks_the_newest_row() {
        let temp = tempdir().expect("tempdir");
        let warehouse =
            Warehouse::open(WarehouseConfig::at(temp.path().join("w.duckdb"))).expect("open");
        assert_eq!(warehouse.latest_timestamp("SPY").expect("latest"), None);

        warehouse
            .upsert(&[
                bar("SPY", datetime!(2024-06-28 00:00:00), 1.0),
                bar("SPY", datetime!(2024-06-27 00:00:00), 1.0),
            ])
            .expect("upsert");

        assert_eq!(
            warehouse.latest_timestamp("SPY").expect("latest"),
            Some(datetime!(2024-06-28 00:00:00))
        );
    }

    #[test]
    fn ingest_log_round_trips_entries_of_a_run() {
        let temp = tempdir().expect("tempdir");
        let warehouse =
            Warehouse::open(WarehouseConfig::at(temp.path().join("w.duckdb"))).expect("open");

        let entries = vec![
            IngestLogEntry {
                run_id: "run-1".to_string(),
                symbol: "SPY".to_string(),
                status: IngestStatus::Ok,
                rows: 250,
                detail: None,
            },
            IngestLogEntry {
                run_id: "run-1".to_string(),
                symbol: "ZZZ".to_string(),
                status: IngestStatus::SkippedEmpty,
                rows: 0,
                detail: Some("no rows".to_string()),
            },
        ];
        warehouse.record_ingest(&entries).expect("record");

        assert_eq!(warehouse.ingest_log("run-1").expect("log"), entries);
        assert!(warehouse.ingest_log("run-2").expect("log").is_empty());
    }
}
