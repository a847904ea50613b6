//! Persistent snapshot tier consulted before upstream providers.
//!
//! The quote cache only reads from a [`SnapshotStore`]. The write methods
//! exist for the scheduled refresh job that owns the store's contents.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use quoteline_warehouse::{
    DailyQuoteRecord, PriceBarRecord, RefreshLogRecord, Warehouse, WarehouseError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Date;

use crate::{format_date, parse_date, HistoricalBar, Quote, Symbol};

/// Snapshot store failure. The client logs these and treats them as a miss.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("stored row for '{symbol}' is invalid: {reason}")]
    InvalidRow { symbol: String, reason: String },

    #[error("snapshot store lock poisoned")]
    Poisoned,
}

/// Outcome of one refresh-job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Started,
    Success,
    Partial,
    Failed,
}

impl RefreshStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "started" => Some(Self::Started),
            "success" => Some(Self::Success),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Append-only record of a refresh run for one trading day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshLogEntry {
    pub date: Date,
    pub status: RefreshStatus,
    pub symbols_updated: u32,
    pub error_message: Option<String>,
    /// RFC3339 start time.
    pub started_at: String,
    /// RFC3339 end time.
    pub finished_at: Option<String>,
}

/// Second-tier quote and history storage.
///
/// Methods are blocking; the client calls them on tokio's blocking pool.
pub trait SnapshotStore: Send + Sync {
    /// Stored quotes for `symbols` on trading day `date`; missing symbols are skipped.
    fn daily_quotes(&self, symbols: &[Symbol], date: Date) -> Result<Vec<Quote>, StoreError>;

    /// Insert or replace the quote for `(quote.symbol, date)`.
    fn upsert_daily_quote(&self, date: Date, quote: &Quote) -> Result<(), StoreError>;

    /// The most recent `days` bars for `symbol`, oldest first.
    fn history(&self, symbol: &Symbol, days: usize) -> Result<Vec<HistoricalBar>, StoreError>;

    /// Insert or replace bars keyed by `(symbol, bar.date)`.
    fn upsert_history(&self, symbol: &Symbol, bars: &[HistoricalBar]) -> Result<(), StoreError>;

    /// Append a refresh-run entry.
    fn append_refresh_log(&self, entry: &RefreshLogEntry) -> Result<(), StoreError>;

    /// Refresh-run entries for `date` in append order.
    fn refresh_log(&self, date: Date) -> Result<Vec<RefreshLogEntry>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    daily: HashMap<(Symbol, Date), Quote>,
    history: HashMap<Symbol, BTreeMap<Date, HistoricalBar>>,
    log: Vec<RefreshLogEntry>,
}

/// In-process snapshot store, mainly for tests and the CLI's ephemeral mode.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl SnapshotStore for MemoryStore {
    fn daily_quotes(&self, symbols: &[Symbol], date: Date) -> Result<Vec<Quote>, StoreError> {
        let inner = self.lock()?;
        Ok(symbols
            .iter()
            .filter_map(|symbol| inner.daily.get(&(symbol.clone(), date)).cloned())
            .collect())
    }

    fn upsert_daily_quote(&self, date: Date, quote: &Quote) -> Result<(), StoreError> {
        self.lock()?
            .daily
            .insert((quote.symbol.clone(), date), quote.clone());
        Ok(())
    }

    fn history(&self, symbol: &Symbol, days: usize) -> Result<Vec<HistoricalBar>, StoreError> {
        let inner = self.lock()?;
        let Some(bars) = inner.history.get(symbol) else {
            return Ok(Vec::new());
        };

        let mut window: Vec<HistoricalBar> = bars.values().rev().take(days).cloned().collect();
        window.reverse();
        Ok(window)
    }

    fn upsert_history(&self, symbol: &Symbol, bars: &[HistoricalBar]) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let stored = inner.history.entry(symbol.clone()).or_default();
        for bar in bars {
            stored.insert(bar.date, bar.clone());
        }
        Ok(())
    }

    fn append_refresh_log(&self, entry: &RefreshLogEntry) -> Result<(), StoreError> {
        self.lock()?.log.push(entry.clone());
        Ok(())
    }

    fn refresh_log(&self, date: Date) -> Result<Vec<RefreshLogEntry>, StoreError> {
        Ok(self
            .lock()?
            .log
            .iter()
            .filter(|entry| entry.date == date)
            .cloned()
            .collect())
    }
}

impl SnapshotStore for Warehouse {
    fn daily_quotes(&self, symbols: &[Symbol], date: Date) -> Result<Vec<Quote>, StoreError> {
        let keys: Vec<String> = symbols.iter().map(|s| s.as_str().to_owned()).collect();
        Warehouse::daily_quotes(self, &keys, &format_date(date))?
            .into_iter()
            .map(quote_from_record)
            .collect()
    }

    fn upsert_daily_quote(&self, date: Date, quote: &Quote) -> Result<(), StoreError> {
        self.upsert_daily_quotes(&[quote_to_record(date, quote)])?;
        Ok(())
    }

    fn history(&self, symbol: &Symbol, days: usize) -> Result<Vec<HistoricalBar>, StoreError> {
        self.price_bars(symbol.as_str(), days)?
            .into_iter()
            .map(bar_from_record)
            .collect()
    }

    fn upsert_history(&self, symbol: &Symbol, bars: &[HistoricalBar]) -> Result<(), StoreError> {
        let records: Vec<PriceBarRecord> = bars
            .iter()
            .map(|bar| PriceBarRecord {
                symbol: symbol.as_str().to_owned(),
                date: format_date(bar.date),
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: i64::try_from(bar.volume).unwrap_or(i64::MAX),
            })
            .collect();
        self.upsert_price_bars(&records)?;
        Ok(())
    }

    fn append_refresh_log(&self, entry: &RefreshLogEntry) -> Result<(), StoreError> {
        Warehouse::append_refresh_log(
            self,
            &RefreshLogRecord {
                date: format_date(entry.date),
                status: entry.status.as_str().to_owned(),
                symbols_updated: i64::from(entry.symbols_updated),
                error_message: entry.error_message.clone(),
                started_at: entry.started_at.clone(),
                finished_at: entry.finished_at.clone(),
            },
        )?;
        Ok(())
    }

    fn refresh_log(&self, date: Date) -> Result<Vec<RefreshLogEntry>, StoreError> {
        Warehouse::refresh_log(self, &format_date(date))?
            .into_iter()
            .map(|record| {
                let invalid = |reason: String| StoreError::InvalidRow {
                    symbol: String::from("refresh_log"),
                    reason,
                };
                Ok(RefreshLogEntry {
                    date: parse_date(&record.date).map_err(|e| invalid(e.to_string()))?,
                    status: RefreshStatus::parse(&record.status)
                        .ok_or_else(|| invalid(format!("unknown status '{}'", record.status)))?,
                    symbols_updated: u32::try_from(record.symbols_updated)
                        .map_err(|e| invalid(e.to_string()))?,
                    error_message: record.error_message,
                    started_at: record.started_at,
                    finished_at: record.finished_at,
                })
            })
            .collect()
    }
}

fn quote_to_record(date: Date, quote: &Quote) -> DailyQuoteRecord {
    let to_i64 = |value: Option<u64>| value.map(|v| i64::try_from(v).unwrap_or(i64::MAX));
    DailyQuoteRecord {
        symbol: quote.symbol.as_str().to_owned(),
        date: format_date(date),
        market: quote.market.as_str().to_owned(),
        price: quote.price,
        change: quote.change,
        change_percent: quote.change_percent,
        volume: to_i64(quote.volume),
        total_volume: to_i64(quote.total_volume),
        market_cap: quote.market_cap,
        high: quote.high,
        low: quote.low,
        open: quote.open,
        previous_close: quote.previous_close,
        company_name: quote.company_name.clone(),
        high_52_week: quote.high_52_week,
        low_52_week: quote.low_52_week,
        last_updated: quote.last_updated.clone(),
    }
}

fn quote_from_record(record: DailyQuoteRecord) -> Result<Quote, StoreError> {
    let invalid = |reason: String| StoreError::InvalidRow {
        symbol: record.symbol.clone(),
        reason,
    };
    let symbol = Symbol::parse(&record.symbol).map_err(|e| invalid(e.to_string()))?;
    let mut quote = Quote::new(symbol, record.price, record.change, record.change_percent)
        .map_err(|e| invalid(e.to_string()))?;

    let to_u64 = |value: Option<i64>| value.map(|v| v.max(0) as u64);
    quote.volume = to_u64(record.volume);
    quote.total_volume = to_u64(record.total_volume);
    quote.market_cap = record.market_cap;
    quote.high = record.high;
    quote.low = record.low;
    quote.open = record.open;
    quote.previous_close = record.previous_close;
    quote.company_name = record.company_name;
    quote.high_52_week = record.high_52_week;
    quote.low_52_week = record.low_52_week;
    quote.last_updated = record.last_updated;
    Ok(quote)
}

fn bar_from_record(record: PriceBarRecord) -> Result<HistoricalBar, StoreError> {
    let invalid = |reason: String| StoreError::InvalidRow {
        symbol: record.symbol.clone(),
        reason,
    };
    let date = parse_date(&record.date).map_err(|e| invalid(e.to_string()))?;
    HistoricalBar::new(
        date,
        record.open,
        record.high,
        record.low,
        record.close,
        record.volume.max(0) as u64,
    )
    .map_err(|e| invalid(e.to_string()))
}
