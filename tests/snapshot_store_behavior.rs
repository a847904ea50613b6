//! Behaviour tests for the persistent snapshot tier in front of upstream.

use std::sync::Arc;

use quoteline_core::{
    ClientConfig, HistoricalBar, Market, MarketDataClient, MemoryStore, Quote, RefreshLogEntry,
    RefreshStatus, RetryPolicy, SnapshotStore, Sourced, Symbol, Warehouse, WarehouseConfig,
};
use quoteline_tests::{requested_us_symbols, ScriptedHttpClient};
use tempfile::TempDir;
use time::Duration;

fn symbol(value: &str) -> Symbol {
    Symbol::parse(value).expect("valid symbol")
}

fn stored_quote(value: &str, price: f64) -> Quote {
    let mut quote = Quote::new(symbol(value), price, 1.5, 0.5).expect("valid quote");
    quote.volume = Some(42_000);
    quote.company_name = Some(format!("{value} Holdings"));
    quote
}

fn bars_ending_today(value: &str, count: i64) -> Vec<HistoricalBar> {
    let today = symbol(value).market().local_today();
    (0..count)
        .rev()
        .map(|offset| {
            let close = 100.0 + offset as f64;
            let date = today - Duration::days(offset);
            HistoricalBar::new(date, close, close + 1.0, close - 1.0, close, 1_000)
                .expect("valid bar")
        })
        .collect()
}

fn client_over(
    store: Arc<dyn SnapshotStore>,
    http: Arc<ScriptedHttpClient>,
) -> MarketDataClient {
    MarketDataClient::builder()
        .with_config(ClientConfig {
            retry: RetryPolicy::no_retry(),
            ..ClientConfig::default()
        })
        .with_http_client(http)
        .with_store(store)
        .with_fallback_seed(7)
        .build()
        .expect("valid client config")
}

fn temp_warehouse() -> (TempDir, Warehouse) {
    let dir = TempDir::new().expect("temp dir");
    let warehouse = Warehouse::open(WarehouseConfig::at_home(dir.path())).expect("open warehouse");
    (dir, warehouse)
}

// ============================================================================
// Quotes
// ============================================================================

#[tokio::test]
async fn todays_snapshot_is_served_without_going_upstream() {
    // Given: a stored AAPL quote for today
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_daily_quote(Market::Us.local_today(), &stored_quote("AAPL", 188.0))
        .expect("upsert");
    let http = Arc::new(ScriptedHttpClient::healthy());
    let client = client_over(store, Arc::clone(&http));

    // When
    let quote = client.get_one("AAPL").await.expect("valid symbol");

    // Then
    assert!(matches!(quote, Sourced::Stored(_)));
    assert_eq!(quote.value().price, 188.0);
    assert_eq!(http.call_count(), 0);
}

#[tokio::test]
async fn store_misses_fall_through_to_upstream() {
    // Given: only AAPL is stored
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_daily_quote(Market::Us.local_today(), &stored_quote("AAPL", 188.0))
        .expect("upsert");
    let http = Arc::new(ScriptedHttpClient::healthy());
    let client = client_over(store, Arc::clone(&http));

    // When
    let quotes = client.get_many(&["AAPL", "MSFT"]).await.expect("valid symbols");

    // Then: upstream is asked for MSFT alone
    assert!(matches!(quotes[0], Sourced::Stored(_)));
    assert!(matches!(quotes[1], Sourced::Live(_)));
    assert_eq!(http.call_count(), 1);
    assert_eq!(requested_us_symbols(&http.urls()[0]), vec!["MSFT"]);
}

#[tokio::test]
async fn yesterdays_snapshot_is_not_served() {
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_daily_quote(
            Market::Us.local_today() - Duration::days(1),
            &stored_quote("AAPL", 188.0),
        )
        .expect("upsert");
    let http = Arc::new(ScriptedHttpClient::healthy());
    let client = client_over(store, Arc::clone(&http));

    let quote = client.get_one("AAPL").await.expect("valid symbol");

    assert!(matches!(quote, Sourced::Live(_)));
    assert_eq!(http.call_count(), 1);
}

#[tokio::test]
async fn warehouse_serves_taiwan_snapshots_on_the_taipei_calendar() {
    // Given: a DuckDB warehouse holding today's 2330 quote
    let (_dir, warehouse) = temp_warehouse();
    let store: Arc<dyn SnapshotStore> = Arc::new(warehouse);
    store
        .upsert_daily_quote(Market::Tse.local_today(), &stored_quote("2330", 585.0))
        .expect("upsert");
    let http = Arc::new(ScriptedHttpClient::healthy());
    let client = client_over(store, Arc::clone(&http));

    // When
    let quote = client.get_one("2330.TW").await.expect("valid symbol");

    // Then: every stored field survives the round trip
    assert!(matches!(quote, Sourced::Stored(_)));
    let quote = quote.into_inner();
    assert_eq!(quote.market, Market::Tse);
    assert_eq!(quote.price, 585.0);
    assert_eq!(quote.change, 1.5);
    assert_eq!(quote.volume, Some(42_000));
    assert_eq!(quote.company_name.as_deref(), Some("2330 Holdings"));
    assert_eq!(http.call_count(), 0);
}

#[tokio::test]
async fn upserting_a_snapshot_twice_keeps_the_latest() {
    let (_dir, warehouse) = temp_warehouse();
    let store: &dyn SnapshotStore = &warehouse;
    let today = Market::Us.local_today();

    store
        .upsert_daily_quote(today, &stored_quote("NVDA", 900.0))
        .expect("first upsert");
    store
        .upsert_daily_quote(today, &stored_quote("NVDA", 905.5))
        .expect("second upsert");

    let quotes = store.daily_quotes(&[symbol("NVDA")], today).expect("query");
    assert_eq!(quotes.len(), 1);
    assert_eq!(quotes[0].price, 905.5);
}

// ============================================================================
// History
// ============================================================================

#[tokio::test]
async fn stored_history_covering_the_window_is_served() {
    // Given: ten stored bars
    let (_dir, warehouse) = temp_warehouse();
    let store: Arc<dyn SnapshotStore> = Arc::new(warehouse);
    store
        .upsert_history(&symbol("MSFT"), &bars_ending_today("MSFT", 10))
        .expect("upsert");
    let http = Arc::new(ScriptedHttpClient::healthy());
    let client = client_over(store, Arc::clone(&http));

    // When
    let history = client.get_history("MSFT", 5).await.expect("valid request");

    // Then: the latest five, oldest first, straight from the store
    assert!(matches!(history, Sourced::Stored(_)));
    let closes: Vec<f64> = history.value().iter().map(|bar| bar.close).collect();
    assert_eq!(closes, vec![104.0, 103.0, 102.0, 101.0, 100.0]);
    assert_eq!(http.call_count(), 0);
}

#[tokio::test]
async fn short_stored_history_defers_to_upstream() {
    // Given: three stored bars and an upstream with no chart data
    let store = Arc::new(MemoryStore::new());
    store
        .upsert_history(&symbol("MSFT"), &bars_ending_today("MSFT", 3))
        .expect("upsert");
    let http = Arc::new(ScriptedHttpClient::healthy());
    let client = client_over(store, Arc::clone(&http));

    // When
    let history = client.get_history("MSFT", 10).await.expect("valid request");

    // Then: upstream was tried and a full synthetic window came back
    assert_eq!(http.call_count(), 1);
    assert!(history.is_fallback());
    let bars = history.value();
    assert_eq!(bars.len(), 10);
    assert_eq!(bars[9].date, Market::Us.local_today());
    assert!(bars.windows(2).all(|pair| pair[0].date < pair[1].date));
}

// ============================================================================
// Refresh log
// ============================================================================

#[test]
fn refresh_log_entries_are_kept_in_order() {
    let (_dir, warehouse) = temp_warehouse();
    let store: &dyn SnapshotStore = &warehouse;
    let date = Market::Us.local_today();

    store
        .append_refresh_log(&RefreshLogEntry {
            date,
            status: RefreshStatus::Started,
            symbols_updated: 0,
            error_message: None,
            started_at: String::from("2024-05-10T06:00:00Z"),
            finished_at: None,
        })
        .expect("append started");
    store
        .append_refresh_log(&RefreshLogEntry {
            date,
            status: RefreshStatus::Partial,
            symbols_updated: 12,
            error_message: Some(String::from("no live data for 6547")),
            started_at: String::from("2024-05-10T06:00:00Z"),
            finished_at: Some(String::from("2024-05-10T06:00:09Z")),
        })
        .expect("append finished");

    let log = store.refresh_log(date).expect("query");
    let statuses: Vec<RefreshStatus> = log.iter().map(|entry| entry.status).collect();
    assert_eq!(statuses, vec![RefreshStatus::Started, RefreshStatus::Partial]);
    assert_eq!(log[1].symbols_updated, 12);
    assert_eq!(log[1].error_message.as_deref(), Some("no live data for 6547"));
    assert!(store
        .refresh_log(date - Duration::days(1))
        .expect("query")
        .is_empty());
}
