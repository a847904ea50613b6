//! Chunked upstream quote fetching.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{MarketAdapter, QuoteCall, TaiwanAdapter, UsAdapter};
use crate::config::ClientConfig;
use crate::http_client::{HttpClient, HttpRequest};
use crate::retry::RetryPolicy;
use crate::source::SourceError;
use crate::{HistoricalBar, Market, Quote, Symbol, ValidationError};

/// Why a requested symbol produced no quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The upstream answered but did not include the symbol.
    NotFound,
    /// The whole upstream call failed after retries.
    Unavailable(String),
}

impl Display for FailureReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found upstream"),
            Self::Unavailable(message) => write!(f, "upstream unavailable: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub symbol: Symbol,
    pub reason: FailureReason,
}

/// Per-symbol results of one [`BatchFetcher::fetch_batch`] call.
///
/// Every requested symbol appears exactly once, in either list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub succeeded: Vec<Quote>,
    pub failed: Vec<FetchFailure>,
}

/// Groups symbols by market board, splits each group into chunks and runs
/// every chunk's upstream call through the retry policy.
#[derive(Clone)]
pub struct BatchFetcher {
    http: Arc<dyn HttpClient>,
    us: UsAdapter,
    taiwan: TaiwanAdapter,
    retry: RetryPolicy,
    batch_size: usize,
    chunk_pause: Duration,
}

impl BatchFetcher {
    pub fn new(http: Arc<dyn HttpClient>, config: &ClientConfig) -> Self {
        let timeout_ms = config.http_timeout_ms();
        Self {
            http,
            us: UsAdapter::new(timeout_ms),
            taiwan: TaiwanAdapter::new(timeout_ms),
            retry: config.retry,
            batch_size: config.batch_size.max(1),
            chunk_pause: config.chunk_pause,
        }
    }

    fn adapter_for(&self, symbol: &Symbol) -> &dyn MarketAdapter {
        if symbol.market().is_taiwan() {
            &self.taiwan
        } else {
            &self.us
        }
    }

    /// Fetch quotes for `symbols`.
    ///
    /// Symbols are matched to response entries by value, never by position.
    pub async fn fetch_batch(&self, symbols: &[Symbol]) -> Result<BatchOutcome, ValidationError> {
        if symbols.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }

        // One group per upstream endpoint, so every chunk is a single call.
        let groups: Vec<(&dyn MarketAdapter, Vec<Symbol>)> = [Market::Us, Market::Tse, Market::Otc]
            .into_iter()
            .map(|market| {
                let adapter: &dyn MarketAdapter = if market.is_taiwan() {
                    &self.taiwan
                } else {
                    &self.us
                };
                let group = symbols
                    .iter()
                    .filter(|symbol| symbol.market() == market)
                    .cloned()
                    .collect();
                (adapter, group)
            })
            .collect();

        let mut chunks: Vec<(&dyn MarketAdapter, &[Symbol])> = Vec::new();
        for (adapter, group) in &groups {
            for chunk in group.chunks(self.batch_size) {
                chunks.push((*adapter, chunk));
            }
        }

        let mut outcome = BatchOutcome::default();
        let total_chunks = chunks.len();
        for (index, (adapter, chunk)) in chunks.into_iter().enumerate() {
            for call in adapter.quote_requests(chunk) {
                self.run_quote_call(adapter, call, &mut outcome).await;
            }

            if index + 1 < total_chunks && !self.chunk_pause.is_zero() {
                tokio::time::sleep(self.chunk_pause).await;
            }
        }

        tracing::info!(
            requested = symbols.len(),
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            chunks = total_chunks,
            "batch fetch finished"
        );
        Ok(outcome)
    }

    async fn run_quote_call(
        &self,
        adapter: &dyn MarketAdapter,
        call: QuoteCall,
        outcome: &mut BatchOutcome,
    ) {
        let request = call.request;
        let result = self
            .retry
            .execute(move |_attempt| self.request_quotes(adapter, request.clone()))
            .await;

        match result {
            Ok(quotes) => {
                let mut by_symbol: HashMap<Symbol, Quote> = quotes
                    .into_iter()
                    .map(|quote| (quote.symbol.clone(), quote))
                    .collect();

                for symbol in call.symbols {
                    match by_symbol.remove(&symbol) {
                        Some(quote) => outcome.succeeded.push(quote),
                        None => {
                            tracing::debug!(symbol = %symbol, source = adapter.name(), "symbol missing from response");
                            outcome.failed.push(FetchFailure {
                                symbol,
                                reason: FailureReason::NotFound,
                            });
                        }
                    }
                }
            }
            Err(error) => {
                tracing::warn!(
                    source = adapter.name(),
                    count = call.symbols.len(),
                    code = error.code(),
                    error = %error,
                    "quote chunk failed"
                );
                let message = error.to_string();
                outcome
                    .failed
                    .extend(call.symbols.into_iter().map(|symbol| FetchFailure {
                        symbol,
                        reason: FailureReason::Unavailable(message.clone()),
                    }));
            }
        }
    }

    async fn request_quotes(
        &self,
        adapter: &dyn MarketAdapter,
        request: HttpRequest,
    ) -> Result<Vec<Quote>, SourceError> {
        let body = self.request_body(adapter, request).await?;
        adapter.parse_quotes(&body)
    }

    async fn request_body(
        &self,
        adapter: &dyn MarketAdapter,
        request: HttpRequest,
    ) -> Result<String, SourceError> {
        let response = self.http.execute(request).await.map_err(|error| {
            SourceError::unavailable(format!("{} request failed: {error}", adapter.name()))
        })?;

        if !response.is_success() {
            return Err(SourceError::unavailable(format!(
                "{} returned HTTP {}",
                adapter.name(),
                response.status
            )));
        }
        Ok(response.body)
    }

    /// The last `days` daily bars for `symbol`, oldest first.
    ///
    /// Periods are requested newest first until enough bars are collected. A
    /// period that fails is skipped; the call fails only when no period yields
    /// any bars.
    pub async fn fetch_history(
        &self,
        symbol: &Symbol,
        days: usize,
    ) -> Result<Vec<HistoricalBar>, SourceError> {
        let adapter = self.adapter_for(symbol);
        let today = symbol.market().local_today();

        let mut bars: Vec<HistoricalBar> = Vec::new();
        let mut last_error = None;
        for request in adapter.history_requests(symbol, days, today) {
            let page = self
                .retry
                .execute(move |_attempt| self.request_body(adapter, request.clone()))
                .await
                .and_then(|body| adapter.parse_history(&body));

            match page {
                Ok(page) => bars.extend(page),
                Err(error) => {
                    tracing::warn!(symbol = %symbol, code = error.code(), error = %error, "history period failed");
                    last_error = Some(error);
                }
            }

            if bars.len() >= days {
                break;
            }
        }

        if bars.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                SourceError::not_found(format!("no history returned for {symbol}"))
            }));
        }

        bars.sort_by_key(|bar| bar.date);
        bars.dedup_by_key(|bar| bar.date);
        let keep_from = bars.len().saturating_sub(days);
        Ok(bars.split_off(keep_from))
    }
}
