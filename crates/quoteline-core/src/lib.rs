//! # Quoteline Core
//!
//! Client-side quote caching and batching for US (Yahoo) and Taiwan (TWSE)
//! equities.
//!
//! ## Overview
//!
//! - **Quote cache** with a fixed freshness window
//! - **Request coalescing** so concurrent callers share one upstream fetch
//! - **Batched, chunked upstream calls** with bounded retry
//! - **Market adapters** for the Yahoo and TWSE wire formats
//! - **Fallback data** when upstream has nothing to offer
//! - **Snapshot store tier** consulted before upstream
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Yahoo and TWSE request builders and parsers |
//! | [`batch`] | Chunked upstream fetching |
//! | [`cache`] | Time-bounded quote cache |
//! | [`client`] | Request coordinator (`MarketDataClient`) |
//! | [`config`] | Client configuration |
//! | [`domain`] | Symbols, quotes, bars, provenance |
//! | [`error`] | Validation errors |
//! | [`fallback`] | Synthetic quotes and history |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`retry`] | Exponential-backoff retry executor |
//! | [`source`] | Upstream failure classification |
//! | [`store`] | Snapshot store trait and implementations |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quoteline_core::MarketDataClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), quoteline_core::ValidationError> {
//!     let client = MarketDataClient::builder().build()?;
//!
//!     let quote = client.get_one("2330").await?;
//!     println!("{} {:.2} ({})", quote.value().symbol, quote.value().price, quote.label());
//!
//!     let quotes = client.get_many(&["AAPL", "GOOGL", "AAPL"]).await?;
//!     assert_eq!(quotes.len(), 2);
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! Only malformed input is an error. Upstream outages and unknown symbols
//! resolve to [`Sourced::Fallback`] values:
//!
//! ```rust
//! use quoteline_core::{Quote, Sourced};
//!
//! fn describe(quote: &Sourced<Quote>) -> &'static str {
//!     match quote {
//!         Sourced::Live(_) => "fresh from upstream",
//!         Sourced::Stored(_) => "from today's snapshot",
//!         Sourced::Fallback(_) => "synthetic",
//!     }
//! }
//! ```

pub mod adapters;
pub mod batch;
pub mod cache;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod fallback;
pub mod http_client;
pub mod retry;
pub mod source;
pub mod store;

pub use adapters::{minguo_to_date, parse_twse_number, MarketAdapter, TaiwanAdapter, UsAdapter};

pub use batch::{BatchFetcher, BatchOutcome, FailureReason, FetchFailure};

pub use cache::{QuoteCache, CACHE_DURATION};

pub use client::{CacheStats, MarketDataClient, MarketDataClientBuilder};

pub use config::{ClientConfig, MAX_HISTORY_DAYS};

pub use domain::{
    format_date, parse_date, HistoricalBar, Market, Quote, Sourced, Symbol, OTC_SYMBOLS,
    POPULAR_TSE_SYMBOLS, POPULAR_US_SYMBOLS,
};

pub use error::ValidationError;

pub use fallback::{FallbackGenerator, DEFAULT_BASE_PRICE, FALLBACK_HISTORY_DAYS};

pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

pub use retry::RetryPolicy;

pub use source::{SourceError, SourceErrorKind};

pub use store::{MemoryStore, RefreshLogEntry, RefreshStatus, SnapshotStore, StoreError};

pub use quoteline_warehouse::{Warehouse, WarehouseConfig, WarehouseError};
