//! Request coordinator: cache lookups, request coalescing and the drain queue.
//!
//! All mutable coordinator state (cache, pending registry, queue and the
//! processing flag) lives behind one mutex that is never held across an
//! `.await`. At most one pending request exists per symbol at any time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{FutureExt, Shared};
use serde::Serialize;
use time::Date;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::batch::BatchFetcher;
use crate::cache::QuoteCache;
use crate::config::{ClientConfig, MAX_HISTORY_DAYS};
use crate::fallback::FallbackGenerator;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::store::SnapshotStore;
use crate::{
    HistoricalBar, Quote, Sourced, Symbol, ValidationError, OTC_SYMBOLS, POPULAR_TSE_SYMBOLS,
    POPULAR_US_SYMBOLS,
};

const PRELOAD_TSE_COUNT: usize = 5;
const PRELOAD_OTC_COUNT: usize = 3;

type QuoteWaiter = Shared<oneshot::Receiver<Sourced<Quote>>>;

struct PendingRequest {
    id: u64,
    sender: oneshot::Sender<Sourced<Quote>>,
    waiter: QuoteWaiter,
    enqueued_at: Instant,
}

struct CoordinatorState {
    cache: QuoteCache,
    pending: HashMap<Symbol, PendingRequest>,
    queue: VecDeque<Symbol>,
    processing: bool,
    next_id: u64,
}

impl CoordinatorState {
    /// The in-flight request for `symbol`, registering a new one when absent.
    ///
    /// The flag is true when this call created the entry.
    fn join_or_register(&mut self, symbol: &Symbol) -> (u64, QuoteWaiter, Instant, bool) {
        if let Some(pending) = self.pending.get(symbol) {
            return (
                pending.id,
                pending.waiter.clone(),
                pending.enqueued_at,
                false,
            );
        }

        let id = self.next_id;
        self.next_id += 1;
        let (sender, receiver) = oneshot::channel();
        let waiter = receiver.shared();
        let enqueued_at = Instant::now();
        self.pending.insert(
            symbol.clone(),
            PendingRequest {
                id,
                sender,
                waiter: waiter.clone(),
                enqueued_at,
            },
        );
        (id, waiter, enqueued_at, true)
    }

    /// Cache `quote` and wake whoever is waiting on its symbol.
    fn publish(&mut self, quote: Sourced<Quote>) {
        let symbol = quote.value().symbol.clone();
        if let Some(pending) = self.pending.remove(&symbol) {
            let _ = pending.sender.send(quote.clone());
        }
        self.cache.put(symbol, quote);
    }
}

struct ClientInner {
    config: ClientConfig,
    fetcher: BatchFetcher,
    fallback: FallbackGenerator,
    store: Option<Arc<dyn SnapshotStore>>,
    state: Mutex<CoordinatorState>,
}

/// Point-in-time coordinator telemetry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub cache_size: usize,
    pub queue_size: usize,
    pub pending: usize,
    pub is_processing: bool,
    /// Percentage of cache lookups that hit, 0 before any lookup.
    pub hit_rate: f64,
}

/// Builder for [`MarketDataClient`].
#[derive(Default)]
pub struct MarketDataClientBuilder {
    config: Option<ClientConfig>,
    http: Option<Arc<dyn HttpClient>>,
    store: Option<Arc<dyn SnapshotStore>>,
    fallback_seed: Option<u64>,
}

impl MarketDataClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use `http` for upstream calls instead of the reqwest client.
    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Consult `store` before calling upstream.
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Fix the fallback generator's seed so synthetic values are reproducible.
    pub fn with_fallback_seed(mut self, seed: u64) -> Self {
        self.fallback_seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<MarketDataClient, ValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let http = self
            .http
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let fallback = self
            .fallback_seed
            .map_or_else(FallbackGenerator::default, FallbackGenerator::new);

        Ok(MarketDataClient {
            inner: Arc::new(ClientInner {
                fetcher: BatchFetcher::new(http, &config),
                fallback,
                store: self.store,
                state: Mutex::new(CoordinatorState {
                    cache: QuoteCache::new(config.cache_ttl),
                    pending: HashMap::new(),
                    queue: VecDeque::new(),
                    processing: false,
                    next_id: 0,
                }),
                config,
            }),
        })
    }
}

/// Quote client with a shared cache. Clones share all state.
#[derive(Clone)]
pub struct MarketDataClient {
    inner: Arc<ClientInner>,
}

impl MarketDataClient {
    pub fn builder() -> MarketDataClientBuilder {
        MarketDataClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        // No invariant spans a panic point inside the critical sections.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Quote for one symbol.
    ///
    /// Served from the cache when fresh. Otherwise the symbol joins the drain
    /// queue (or an in-flight request for it) and the call resolves when that
    /// pass completes, or with a fallback once the pending timeout elapses.
    pub async fn get_one(&self, symbol: &str) -> Result<Sourced<Quote>, ValidationError> {
        let symbol = Symbol::parse(symbol)?;
        Ok(self.quote_for(symbol).await)
    }

    async fn quote_for(&self, symbol: Symbol) -> Sourced<Quote> {
        let (id, waiter, deadline, start_drain) = {
            let mut state = self.state();
            state.cache.sweep();
            if let Some(hit) = state.cache.get(&symbol) {
                tracing::debug!(symbol = %symbol, "cache hit");
                return hit;
            }

            let (id, waiter, enqueued_at, registered) = state.join_or_register(&symbol);
            if registered {
                state.queue.push_back(symbol.clone());
            } else {
                tracing::debug!(symbol = %symbol, "joining in-flight request");
            }

            let start_drain = !state.processing;
            state.processing = true;
            (
                id,
                waiter,
                enqueued_at + self.inner.config.pending_timeout,
                start_drain,
            )
        };

        if start_drain {
            let client = self.clone();
            tokio::spawn(async move { client.drain_queue().await });
        }

        self.await_pending(&symbol, id, waiter, deadline).await
    }

    async fn await_pending(
        &self,
        symbol: &Symbol,
        id: u64,
        waiter: QuoteWaiter,
        deadline: Instant,
    ) -> Sourced<Quote> {
        match tokio::time::timeout_at(deadline, waiter.clone()).await {
            Ok(Ok(quote)) => quote,
            Ok(Err(_)) | Err(_) => self.expire_pending(symbol, id, waiter),
        }
    }

    /// Resolve a request whose deadline passed or whose sender vanished.
    fn expire_pending(&self, symbol: &Symbol, id: u64, waiter: QuoteWaiter) -> Sourced<Quote> {
        let mut state = self.state();

        let owns_entry = state
            .pending
            .get(symbol)
            .is_some_and(|pending| pending.id == id);
        if !owns_entry {
            // The drain pass won the race after the deadline fired.
            if let Some(Ok(quote)) = waiter.now_or_never() {
                return quote;
            }
        }

        tracing::warn!(symbol = %symbol, "pending request timed out, serving fallback quote");
        let quote = Sourced::Fallback(self.inner.fallback.fallback_quote(symbol));
        if owns_entry {
            state.publish(quote.clone());
        } else {
            state.cache.put(symbol.clone(), quote.clone());
        }
        quote
    }

    async fn drain_queue(&self) {
        let batch_size = self.inner.config.batch_size;
        let chunk_pause = self.inner.config.chunk_pause;

        loop {
            let pass = {
                let mut state = self.state();
                let mut pass: Vec<Symbol> = Vec::with_capacity(batch_size);
                while pass.len() < batch_size {
                    let Some(symbol) = state.queue.pop_front() else {
                        break;
                    };
                    if let Some(fresh) = state.cache.peek(&symbol) {
                        state.publish(fresh);
                        continue;
                    }
                    if !pass.contains(&symbol) {
                        pass.push(symbol);
                    }
                }

                if pass.is_empty() {
                    state.processing = false;
                    return;
                }
                pass
            };

            tracing::debug!(count = pass.len(), "draining queued symbols");
            let resolved = self.resolve_symbols(&pass).await;

            let more_queued = {
                let mut state = self.state();
                for quote in resolved {
                    state.publish(quote);
                }
                !state.queue.is_empty()
            };

            if more_queued && !chunk_pause.is_zero() {
                tokio::time::sleep(chunk_pause).await;
            }
        }
    }

    /// Quotes for several symbols, one per unique symbol in first-seen order.
    ///
    /// Symbols already in flight are joined. The remaining misses skip the
    /// per-symbol queue and go upstream as one batch, registered as pending so
    /// concurrent `get_one` callers attach to them.
    pub async fn get_many<S: AsRef<str>>(
        &self,
        symbols: &[S],
    ) -> Result<Vec<Sourced<Quote>>, ValidationError> {
        let mut unique: Vec<Symbol> = Vec::with_capacity(symbols.len());
        let mut seen = HashSet::with_capacity(symbols.len());
        for raw in symbols {
            let symbol = Symbol::parse(raw.as_ref())?;
            if seen.insert(symbol.clone()) {
                unique.push(symbol);
            }
        }

        if unique.is_empty() {
            return Ok(Vec::new());
        }
        let max = self.inner.config.max_request_symbols;
        if unique.len() > max {
            return Err(ValidationError::TooManySymbols {
                count: unique.len(),
                max,
            });
        }

        let mut found: HashMap<Symbol, Sourced<Quote>> = HashMap::with_capacity(unique.len());
        let mut joined: Vec<(Symbol, u64, QuoteWaiter, Instant)> = Vec::new();
        let mut misses: Vec<Symbol> = Vec::new();
        {
            let mut state = self.state();
            state.cache.sweep();
            for symbol in &unique {
                if let Some(hit) = state.cache.get(symbol) {
                    found.insert(symbol.clone(), hit);
                    continue;
                }

                let (id, waiter, enqueued_at, registered) = state.join_or_register(symbol);
                if registered {
                    misses.push(symbol.clone());
                } else {
                    tracing::debug!(symbol = %symbol, "joining in-flight request");
                    let deadline = enqueued_at + self.inner.config.pending_timeout;
                    joined.push((symbol.clone(), id, waiter, deadline));
                }
            }
        }

        if !misses.is_empty() {
            // Runs detached so registered entries are resolved even if this
            // caller is dropped mid-fetch.
            let client = self.clone();
            let fetch = tokio::spawn(async move {
                let resolved = client.resolve_symbols(&misses).await;
                {
                    let mut state = client.state();
                    for quote in &resolved {
                        state.publish(quote.clone());
                    }
                }
                resolved
            });

            match fetch.await {
                Ok(resolved) => {
                    for quote in resolved {
                        found.insert(quote.value().symbol.clone(), quote);
                    }
                }
                Err(error) => tracing::warn!(error = %error, "batch fetch task failed"),
            }
        }

        for (symbol, id, waiter, deadline) in joined {
            let quote = self.await_pending(&symbol, id, waiter, deadline).await;
            found.insert(symbol, quote);
        }

        Ok(unique
            .iter()
            .map(|symbol| {
                found.remove(symbol).unwrap_or_else(|| {
                    Sourced::Fallback(self.inner.fallback.fallback_quote(symbol))
                })
            })
            .collect())
    }

    /// Store, then upstream, then fallback. Output follows `symbols` order.
    async fn resolve_symbols(&self, symbols: &[Symbol]) -> Vec<Sourced<Quote>> {
        let mut resolved: HashMap<Symbol, Sourced<Quote>> = self
            .stored_quotes(symbols)
            .await
            .into_iter()
            .filter(|quote| symbols.contains(&quote.symbol))
            .map(|quote| (quote.symbol.clone(), Sourced::Stored(quote)))
            .collect();

        let missing: Vec<Symbol> = symbols
            .iter()
            .filter(|symbol| !resolved.contains_key(*symbol))
            .cloned()
            .collect();

        if !missing.is_empty() {
            match self.inner.fetcher.fetch_batch(&missing).await {
                Ok(outcome) => {
                    for quote in outcome.succeeded {
                        resolved.insert(quote.symbol.clone(), Sourced::Live(quote));
                    }
                    for failure in outcome.failed {
                        tracing::warn!(
                            symbol = %failure.symbol,
                            reason = %failure.reason,
                            "serving fallback quote"
                        );
                    }
                }
                Err(error) => tracing::warn!(error = %error, "batch fetch rejected"),
            }
        }

        symbols
            .iter()
            .map(|symbol| {
                resolved.remove(symbol).unwrap_or_else(|| {
                    Sourced::Fallback(self.inner.fallback.fallback_quote(symbol))
                })
            })
            .collect()
    }

    /// Today's stored snapshots, keyed by each symbol's exchange-local day.
    async fn stored_quotes(&self, symbols: &[Symbol]) -> Vec<Quote> {
        let Some(store) = self.inner.store.clone() else {
            return Vec::new();
        };

        let mut by_day: HashMap<Date, Vec<Symbol>> = HashMap::new();
        for symbol in symbols {
            by_day
                .entry(symbol.market().local_today())
                .or_default()
                .push(symbol.clone());
        }

        let lookup = tokio::task::spawn_blocking(move || {
            let mut quotes = Vec::new();
            for (day, group) in by_day {
                match store.daily_quotes(&group, day) {
                    Ok(found) => quotes.extend(found),
                    Err(error) => {
                        tracing::warn!(count = group.len(), error = %error, "snapshot store lookup failed");
                    }
                }
            }
            quotes
        })
        .await;

        match lookup {
            Ok(quotes) => {
                if !quotes.is_empty() {
                    tracing::debug!(count = quotes.len(), "served quotes from snapshot store");
                }
                quotes
            }
            Err(error) => {
                tracing::warn!(error = %error, "snapshot store task failed");
                Vec::new()
            }
        }
    }

    /// The last `days` daily bars for `symbol`, oldest first.
    ///
    /// A store holding the full window wins; otherwise upstream is asked, and
    /// any upstream failure yields `days` synthetic bars ending today.
    pub async fn get_history(
        &self,
        symbol: &str,
        days: usize,
    ) -> Result<Sourced<Vec<HistoricalBar>>, ValidationError> {
        let symbol = Symbol::parse(symbol)?;
        if days == 0 || days > MAX_HISTORY_DAYS {
            return Err(ValidationError::InvalidHistoryDays {
                days,
                max: MAX_HISTORY_DAYS,
            });
        }

        if let Some(bars) = self.stored_history(&symbol, days).await {
            return Ok(Sourced::Stored(bars));
        }

        match self.inner.fetcher.fetch_history(&symbol, days).await {
            Ok(bars) => Ok(Sourced::Live(bars)),
            Err(error) => {
                tracing::warn!(
                    symbol = %symbol,
                    code = error.code(),
                    error = %error,
                    "serving fallback history"
                );
                Ok(Sourced::Fallback(self.inner.fallback.fallback_history_until(
                    &symbol,
                    days,
                    symbol.market().local_today(),
                )))
            }
        }
    }

    async fn stored_history(&self, symbol: &Symbol, days: usize) -> Option<Vec<HistoricalBar>> {
        let store = self.inner.store.clone()?;
        let key = symbol.clone();
        let lookup = tokio::task::spawn_blocking(move || store.history(&key, days)).await;

        match lookup {
            Ok(Ok(bars)) if bars.len() >= days => Some(bars),
            Ok(Ok(_)) => None,
            Ok(Err(error)) => {
                tracing::warn!(symbol = %symbol, error = %error, "snapshot store history lookup failed");
                None
            }
            Err(error) => {
                tracing::warn!(symbol = %symbol, error = %error, "snapshot store task failed");
                None
            }
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        let state = self.state();
        CacheStats {
            cache_size: state.cache.len(),
            queue_size: state.queue.len(),
            pending: state.pending.len(),
            is_processing: state.processing,
            hit_rate: state.cache.hit_rate(),
        }
    }

    /// Drop every cached quote and reset hit/miss counters.
    ///
    /// Queued and in-flight requests are left to complete.
    pub fn clear_cache(&self) {
        self.state().cache.clear();
        tracing::debug!("quote cache cleared");
    }

    /// Warm the cache with popular US and Taiwan symbols in the background.
    ///
    /// The task yields the number of quotes loaded.
    pub fn preload_popular(&self) -> JoinHandle<usize> {
        let client = self.clone();
        tokio::spawn(async move {
            let taiwan: Vec<&str> = POPULAR_TSE_SYMBOLS
                .iter()
                .take(PRELOAD_TSE_COUNT)
                .chain(OTC_SYMBOLS.iter().take(PRELOAD_OTC_COUNT))
                .copied()
                .collect();

            let mut loaded = 0;
            for group in [POPULAR_US_SYMBOLS.as_slice(), taiwan.as_slice()] {
                match client.get_many(group).await {
                    Ok(quotes) => loaded += quotes.len(),
                    Err(error) => tracing::warn!(error = %error, "preload group rejected"),
                }
            }

            tracing::info!(count = loaded, "preloaded popular symbols");
            loaded
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::http_client::{HttpError, HttpRequest, HttpResponse};
    use crate::retry::RetryPolicy;

    struct FailingHttpClient {
        calls: AtomicUsize,
    }

    impl HttpClient for FailingHttpClient {
        fn execute<'a>(
            &'a self,
            _request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(HttpError::new("connection refused")) })
        }
    }

    fn client(http: Arc<FailingHttpClient>) -> MarketDataClient {
        MarketDataClient::builder()
            .with_config(ClientConfig {
                retry: RetryPolicy::no_retry(),
                ..ClientConfig::default()
            })
            .with_http_client(http)
            .with_fallback_seed(7)
            .build()
            .expect("valid config")
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_resolves_to_cached_fallback() {
        let http = Arc::new(FailingHttpClient {
            calls: AtomicUsize::new(0),
        });
        let client = client(http.clone());

        let first = client.get_one("AAPL").await.expect("valid symbol");
        assert!(first.is_fallback());
        assert_eq!(http.calls.load(Ordering::SeqCst), 1);

        let second = client.get_one("aapl").await.expect("valid symbol");
        assert_eq!(second, first);
        assert_eq!(http.calls.load(Ordering::SeqCst), 1);

        let stats = client.cache_stats();
        assert_eq!(stats.cache_size, 1);
        assert_eq!(stats.pending, 0);
        assert!((stats.hit_rate - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_outage_yields_requested_fallback_window() {
        let http = Arc::new(FailingHttpClient {
            calls: AtomicUsize::new(0),
        });
        let client = client(http);

        let history = client.get_history("MSFT", 12).await.expect("valid input");
        assert!(history.is_fallback());
        assert_eq!(history.value().len(), 12);

        let error = client.get_history("MSFT", 0).await.expect_err("zero days");
        assert_eq!(
            error,
            ValidationError::InvalidHistoryDays {
                days: 0,
                max: MAX_HISTORY_DAYS,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cache_resets_entries_and_counters() {
        let http = Arc::new(FailingHttpClient {
            calls: AtomicUsize::new(0),
        });
        let client = client(http.clone());

        client.get_many(&["AAPL", "MSFT"]).await.expect("valid input");
        client.clear_cache();

        let stats = client.cache_stats();
        assert_eq!(stats.cache_size, 0);
        assert_eq!(stats.hit_rate, 0.0);

        tokio::time::advance(Duration::from_millis(1)).await;
        client.get_one("AAPL").await.expect("valid symbol");
        assert_eq!(http.calls.load(Ordering::SeqCst), 2);
    }
}
