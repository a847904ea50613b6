//! # Quoteline Warehouse
//!
//! DuckDB-backed snapshot store for quoteline.
//!
//! The warehouse keeps one quote per symbol and trading day, daily price
//! history, and an append-only log of refresh runs. The quote cache reads from
//! it as a second tier before calling upstream providers; writes belong to the
//! scheduled refresh job.
//!
//! ## Tables
//!
//! | Table | Key | Description |
//! |-------|-----|-------------|
//! | `daily_quotes` | `(symbol, date)` | End-of-refresh quote snapshot |
//! | `historical_prices` | `(symbol, date)` | Daily OHLCV bars |
//! | `refresh_log` | append-only | One row per refresh run |
//!
//! ## Example
//!
//! ```rust,no_run
//! use quoteline_warehouse::{PriceBarRecord, Warehouse};
//!
//! let warehouse = Warehouse::open_default()?;
//! warehouse.upsert_price_bars(&[PriceBarRecord {
//!     symbol: "2330".to_string(),
//!     date: "2024-05-10".to_string(),
//!     open: 780.0,
//!     high: 790.0,
//!     low: 775.0,
//!     close: 785.0,
//!     volume: 31_234_567,
//! }])?;
//! let bars = warehouse.price_bars("2330", 30)?;
//! # Ok::<(), quoteline_warehouse::WarehouseError>(())
//! ```

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, Row, ToSql};
use serde::Serialize;
use thiserror::Error;

pub use duckdb::{DuckDbConnectionManager, PooledConnection};

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for quoteline data.
    pub quoteline_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::at_home(resolve_quoteline_home())
    }
}

impl WarehouseConfig {
    /// Configuration rooted at `quoteline_home`.
    pub fn at_home(quoteline_home: impl Into<PathBuf>) -> Self {
        let quoteline_home = quoteline_home.into();
        let db_path = quoteline_home.join("store").join("snapshots.duckdb");
        Self {
            quoteline_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// One stored quote for a symbol on a trading day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyQuoteRecord {
    pub symbol: String,
    /// Trading day as `YYYY-MM-DD`.
    pub date: String,
    pub market: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: Option<i64>,
    pub total_volume: Option<i64>,
    pub market_cap: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub open: Option<f64>,
    pub previous_close: Option<f64>,
    pub company_name: Option<String>,
    pub high_52_week: Option<f64>,
    pub low_52_week: Option<f64>,
    pub last_updated: Option<String>,
}

/// One daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBarRecord {
    pub symbol: String,
    /// Trading day as `YYYY-MM-DD`.
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// One refresh-run log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshLogRecord {
    /// Trading day the run refreshed, as `YYYY-MM-DD`.
    pub date: String,
    pub status: String,
    pub symbols_updated: i64,
    pub error_message: Option<String>,
    /// RFC3339 start time.
    pub started_at: String,
    /// RFC3339 end time, absent while the run is in progress.
    pub finished_at: Option<String>,
}

/// The snapshot store handle. Cheap to clone.
#[derive(Clone)]
pub struct Warehouse {
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Open a warehouse under the default quoteline home.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open (creating if needed) the database and apply pending migrations.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path, config.max_pool_size)?;
        let warehouse = Self { manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Apply schema migrations.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Insert or replace daily quotes keyed by `(symbol, date)`.
    pub fn upsert_daily_quotes(&self, rows: &[DailyQuoteRecord]) -> Result<(), WarehouseError> {
        if rows.is_empty() {
            return Ok(());
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            for row in rows {
                let params: [&dyn ToSql; 17] = [
                    &row.symbol,
                    &row.date,
                    &row.market,
                    &row.price,
                    &row.change,
                    &row.change_percent,
                    &row.volume,
                    &row.total_volume,
                    &row.market_cap,
                    &row.high,
                    &row.low,
                    &row.open,
                    &row.previous_close,
                    &row.company_name,
                    &row.high_52_week,
                    &row.low_52_week,
                    &row.last_updated,
                ];
                connection.execute(
                    "INSERT OR REPLACE INTO daily_quotes \
                     (symbol, date, market, price, change, change_percent, volume, total_volume, \
                      market_cap, high, low, open, previous_close, company_name, high_52_week, \
                      low_52_week, last_updated, updated_at) \
                     VALUES (?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
                      CURRENT_TIMESTAMP)",
                    params.as_slice(),
                )?;
            }
            Ok(())
        })();

        finalize_transaction(&connection, result)
    }

    /// Stored quotes for `symbols` on `date`. Symbols without a row are skipped.
    pub fn daily_quotes(
        &self,
        symbols: &[String],
        date: &str,
    ) -> Result<Vec<DailyQuoteRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT symbol, strftime(date, '%Y-%m-%d'), market, price, change, change_percent, \
             volume, total_volume, market_cap, high, low, open, previous_close, company_name, \
             high_52_week, low_52_week, last_updated \
             FROM daily_quotes WHERE symbol = ? AND date = CAST(? AS DATE)",
        )?;

        let mut records = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let params: [&dyn ToSql; 2] = [symbol, &date];
            let mut rows = statement.query_map(params.as_slice(), read_daily_quote)?;
            if let Some(record) = rows.next() {
                records.push(record?);
            }
        }
        Ok(records)
    }

    /// Insert or replace daily bars keyed by `(symbol, date)`.
    pub fn upsert_price_bars(&self, rows: &[PriceBarRecord]) -> Result<(), WarehouseError> {
        if rows.is_empty() {
            return Ok(());
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            for row in rows {
                let params: [&dyn ToSql; 7] = [
                    &row.symbol,
                    &row.date,
                    &row.open,
                    &row.high,
                    &row.low,
                    &row.close,
                    &row.volume,
                ];
                connection.execute(
                    "INSERT OR REPLACE INTO historical_prices \
                     (symbol, date, open, high, low, close, volume, updated_at) \
                     VALUES (?, CAST(? AS DATE), ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
                    params.as_slice(),
                )?;
            }
            Ok(())
        })();

        finalize_transaction(&connection, result)
    }

    /// The most recent `limit` bars for `symbol`, oldest first.
    pub fn price_bars(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<PriceBarRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT symbol, strftime(date, '%Y-%m-%d'), open, high, low, close, volume \
             FROM historical_prices WHERE symbol = ? ORDER BY date DESC LIMIT ?",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let params: [&dyn ToSql; 2] = [&symbol, &limit];
        let rows = statement.query_map(params.as_slice(), |row| {
            Ok(PriceBarRecord {
                symbol: row.get(0)?,
                date: row.get(1)?,
                open: row.get(2)?,
                high: row.get(3)?,
                low: row.get(4)?,
                close: row.get(5)?,
                volume: row.get(6)?,
            })
        })?;

        let mut bars = rows.collect::<Result<Vec<_>, _>>()?;
        bars.reverse();
        Ok(bars)
    }

    /// Append a refresh-run entry. Entries are never updated in place.
    pub fn append_refresh_log(&self, record: &RefreshLogRecord) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        let params: [&dyn ToSql; 6] = [
            &record.date,
            &record.status,
            &record.symbols_updated,
            &record.error_message,
            &record.started_at,
            &record.finished_at,
        ];
        connection.execute(
            "INSERT INTO refresh_log \
             (date, status, symbols_updated, error_message, started_at, finished_at, logged_at) \
             VALUES (CAST(? AS DATE), ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
            params.as_slice(),
        )?;
        Ok(())
    }

    /// Refresh-run entries for `date` in insertion order.
    pub fn refresh_log(&self, date: &str) -> Result<Vec<RefreshLogRecord>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT strftime(date, '%Y-%m-%d'), status, symbols_updated, error_message, \
             started_at, finished_at \
             FROM refresh_log WHERE date = CAST(? AS DATE) ORDER BY id",
        )?;

        let rows = statement.query_map([date], |row| {
            Ok(RefreshLogRecord {
                date: row.get(0)?,
                status: row.get(1)?,
                symbols_updated: row.get(2)?,
                error_message: row.get(3)?,
                started_at: row.get(4)?,
                finished_at: row.get(5)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn read_daily_quote(row: &Row<'_>) -> Result<DailyQuoteRecord, ::duckdb::Error> {
    Ok(DailyQuoteRecord {
        symbol: row.get(0)?,
        date: row.get(1)?,
        market: row.get(2)?,
        price: row.get(3)?,
        change: row.get(4)?,
        change_percent: row.get(5)?,
        volume: row.get(6)?,
        total_volume: row.get(7)?,
        market_cap: row.get(8)?,
        high: row.get(9)?,
        low: row.get(10)?,
        open: row.get(11)?,
        previous_close: row.get(12)?,
        company_name: row.get(13)?,
        high_52_week: row.get(14)?,
        low_52_week: row.get(15)?,
        last_updated: row.get(16)?,
    })
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

/// Resolve the quoteline home directory from `QUOTELINE_HOME`, then `$HOME/.quoteline`.
pub fn resolve_quoteline_home() -> PathBuf {
    if let Some(path) = env::var_os("QUOTELINE_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".quoteline");
    }

    PathBuf::from(".quoteline")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_warehouse(temp: &tempfile::TempDir) -> Warehouse {
        Warehouse::open(WarehouseConfig {
            max_pool_size: 2,
            ..WarehouseConfig::at_home(temp.path().join("quoteline-home"))
        })
        .expect("warehouse open")
    }

    fn quote_record(symbol: &str, date: &str, price: f64) -> DailyQuoteRecord {
        DailyQuoteRecord {
            symbol: symbol.to_string(),
            date: date.to_string(),
            market: "tse".to_string(),
            price,
            change: 5.0,
            change_percent: 0.86,
            volume: Some(1_234),
            total_volume: None,
            market_cap: None,
            high: Some(590.0),
            low: None,
            open: None,
            previous_close: Some(580.0),
            company_name: Some("台積電".to_string()),
            high_52_week: None,
            low_52_week: None,
            last_updated: Some("2024-05-10 13:30:00".to_string()),
        }
    }

    #[test]
    fn migrations_are_recorded_once() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);
        warehouse.initialize().expect("second initialize is a no-op");

        let connection = warehouse.manager.acquire().expect("acquire");
        let versions = migrations::applied_versions(&connection).expect("versions");
        assert_eq!(versions, vec!["0001_snapshot_tables", "0002_indexes"]);
        assert!(warehouse.db_path().ends_with("store/snapshots.duckdb"));
    }

    #[test]
    fn daily_quote_upsert_replaces_by_symbol_and_date() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);

        warehouse
            .upsert_daily_quotes(&[
                quote_record("2330", "2024-05-10", 585.0),
                quote_record("2330", "2024-05-09", 580.0),
            ])
            .expect("insert");
        warehouse
            .upsert_daily_quotes(&[quote_record("2330", "2024-05-10", 590.0)])
            .expect("replace");

        let found = warehouse
            .daily_quotes(&["2330".to_string(), "2317".to_string()], "2024-05-10")
            .expect("query");
        assert_eq!(found, vec![quote_record("2330", "2024-05-10", 590.0)]);
    }

    #[test]
    fn parameterized_queries_keep_hostile_symbols_inert() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);

        let hostile = r#"AAPL'; DROP TABLE daily_quotes; --"#;
        warehouse
            .upsert_daily_quotes(&[quote_record(hostile, "2024-05-10", 1.0)])
            .expect("insert");

        let found = warehouse
            .daily_quotes(&[hostile.to_string()], "2024-05-10")
            .expect("table still exists");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].symbol, hostile);
    }

    #[test]
    fn price_bars_return_latest_window_oldest_first() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);

        let bars: Vec<PriceBarRecord> = (1..=5)
            .map(|day| PriceBarRecord {
                symbol: "MSFT".to_string(),
                date: format!("2024-05-0{day}"),
                open: 400.0,
                high: 405.0,
                low: 395.0,
                close: 400.0 + f64::from(day),
                volume: 1_000 * i64::from(day),
            })
            .collect();
        warehouse.upsert_price_bars(&bars).expect("insert");

        let window = warehouse.price_bars("MSFT", 3).expect("query");
        let dates: Vec<&str> = window.iter().map(|bar| bar.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-05-03", "2024-05-04", "2024-05-05"]);
        assert!(warehouse.price_bars("AAPL", 3).expect("query").is_empty());
    }

    #[test]
    fn refresh_log_is_append_only_per_date() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_warehouse(&temp);

        let started = RefreshLogRecord {
            date: "2024-05-10".to_string(),
            status: "started".to_string(),
            symbols_updated: 0,
            error_message: None,
            started_at: "2024-05-10T06:00:00Z".to_string(),
            finished_at: None,
        };
        let finished = RefreshLogRecord {
            status: "success".to_string(),
            symbols_updated: 25,
            finished_at: Some("2024-05-10T06:01:10Z".to_string()),
            ..started.clone()
        };
        warehouse.append_refresh_log(&started).expect("append");
        warehouse.append_refresh_log(&finished).expect("append");

        let log = warehouse.refresh_log("2024-05-10").expect("query");
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].symbols_updated, 25);
        assert!(warehouse.refresh_log("2024-05-11").expect("query").is_empty());
    }
}
