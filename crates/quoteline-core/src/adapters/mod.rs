//! Per-market request building and response parsing.
//!
//! Adapters never touch the network themselves; the batch fetcher executes
//! the requests they build and hands the bodies back for parsing.

mod taiwan;
mod us;

pub use taiwan::{minguo_to_date, parse_twse_number, TaiwanAdapter};
pub use us::UsAdapter;

use time::Date;

use crate::http_client::HttpRequest;
use crate::source::SourceError;
use crate::{HistoricalBar, Quote, Symbol};

/// One upstream quote call and the symbols it is expected to answer for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteCall {
    pub request: HttpRequest,
    pub symbols: Vec<Symbol>,
}

/// Market-specific upstream contract.
pub trait MarketAdapter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Build the quote calls covering `symbols`.
    fn quote_requests(&self, symbols: &[Symbol]) -> Vec<QuoteCall>;

    /// Parse a quote response body. Symbols missing from the body are not errors.
    fn parse_quotes(&self, body: &str) -> Result<Vec<Quote>, SourceError>;

    /// Build history calls for the last `days` trading days up to `today`,
    /// newest period first.
    fn history_requests(&self, symbol: &Symbol, days: usize, today: Date) -> Vec<HttpRequest>;

    /// Parse a history response body into bars in any order.
    fn parse_history(&self, body: &str) -> Result<Vec<HistoricalBar>, SourceError>;
}
