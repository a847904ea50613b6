//! Time-bounded quote cache.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::{Quote, Sourced, Symbol};

/// Default freshness window for cached quotes.
pub const CACHE_DURATION: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CacheEntry {
    quote: Sourced<Quote>,
    fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

/// Symbol to last-known quote store.
///
/// An entry is fresh while its age is strictly below the TTL. Stale entries
/// are never returned, even before [`QuoteCache::sweep`] removes them.
#[derive(Debug)]
pub struct QuoteCache {
    entries: HashMap<Symbol, CacheEntry>,
    ttl: Duration,
    hits: u64,
    misses: u64,
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self::new(CACHE_DURATION)
    }
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a fresh entry, counting the hit or miss.
    pub fn get(&mut self, symbol: &Symbol) -> Option<Sourced<Quote>> {
        let found = self.peek(symbol);
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    /// Look up a fresh entry without touching the statistics.
    pub fn peek(&self, symbol: &Symbol) -> Option<Sourced<Quote>> {
        let now = Instant::now();
        self.entries
            .get(symbol)
            .filter(|entry| entry.is_fresh(now, self.ttl))
            .map(|entry| entry.quote.clone())
    }

    /// Insert or replace the entry for `symbol`, stamped now.
    pub fn put(&mut self, symbol: Symbol, quote: Sourced<Quote>) {
        self.entries.insert(
            symbol,
            CacheEntry {
                quote,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop every stale entry.
    pub fn sweep(&mut self) {
        let now = Instant::now();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.is_fresh(now, ttl));
    }

    /// Remove all entries and reset the hit/miss counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Percentage of lookups answered from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(symbol: &str, price: f64) -> (Symbol, Sourced<Quote>) {
        let symbol = Symbol::parse(symbol).expect("valid symbol");
        let quote = Quote::new(symbol.clone(), price, 0.0, 0.0).expect("valid quote");
        (symbol, Sourced::Live(quote))
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_basic_operations() {
        let mut cache = QuoteCache::default();
        let (symbol, first) = quote("AAPL", 150.0);
        let (_, second) = quote("AAPL", 151.0);

        assert!(cache.get(&symbol).is_none());

        cache.put(symbol.clone(), first.clone());
        assert_eq!(cache.get(&symbol), Some(first));

        cache.put(symbol.clone(), second.clone());
        assert_eq!(cache.get(&symbol), Some(second));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_exactly_at_ttl() {
        let mut cache = QuoteCache::default();
        let (symbol, value) = quote("MSFT", 310.0);
        cache.put(symbol.clone(), value);

        tokio::time::advance(Duration::from_millis(299_999)).await;
        assert!(cache.peek(&symbol).is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.peek(&symbol).is_none());
        assert_eq!(cache.len(), 1, "stale entries stay until swept");

        cache.sweep();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_fresh_entries() {
        let mut cache = QuoteCache::new(Duration::from_secs(10));
        let (old, old_value) = quote("AAPL", 1.0);
        cache.put(old.clone(), old_value);

        tokio::time::advance(Duration::from_secs(6)).await;
        let (new, new_value) = quote("GOOGL", 2.0);
        cache.put(new.clone(), new_value);

        tokio::time::advance(Duration::from_secs(5)).await;
        cache.sweep();

        assert!(cache.peek(&old).is_none());
        assert!(cache.peek(&new).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hit_rate_counts_lookups() {
        let mut cache = QuoteCache::default();
        assert_eq!(cache.hit_rate(), 0.0);

        let (symbol, value) = quote("NVDA", 500.0);
        assert!(cache.get(&symbol).is_none());
        cache.put(symbol.clone(), value);
        assert!(cache.get(&symbol).is_some());
        assert!(cache.get(&symbol).is_some());
        assert!(cache.peek(&symbol).is_some());

        assert!((cache.hit_rate() - 200.0 / 3.0).abs() < 1e-9);

        cache.clear();
        assert_eq!(cache.hit_rate(), 0.0);
        assert!(cache.is_empty());
    }
}
