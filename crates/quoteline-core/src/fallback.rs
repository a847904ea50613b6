//! Synthetic quotes and history for when upstream data is unavailable.

use time::{Date, Duration};

use crate::{HistoricalBar, Quote, Symbol};

/// Base price for symbols missing from the lookup table.
pub const DEFAULT_BASE_PRICE: f64 = 100.0;
/// Number of bars produced by [`FallbackGenerator::fallback_history`].
pub const FALLBACK_HISTORY_DAYS: usize = 30;

const MAX_VARIATION: f64 = 0.05;
const PRICE_FLOOR: f64 = 0.8;

const BASE_PRICES: [(&str, f64); 16] = [
    ("AAPL", 150.0),
    ("GOOGL", 2_750.0),
    ("MSFT", 310.0),
    ("TSLA", 245.0),
    ("AMZN", 3_100.0),
    ("NVDA", 500.0),
    ("META", 280.0),
    ("NFLX", 400.0),
    ("2330", 580.0),
    ("2317", 110.0),
    ("2454", 1_200.0),
    ("2881", 15.0),
    ("0050", 140.0),
    ("0056", 35.0),
    ("2412", 120.0),
    ("6547", 300.0),
];

/// Deterministic-seeded producer of synthetic market data.
///
/// The same seed and symbol always yield the same values, so repeated
/// fallbacks for one symbol agree with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackGenerator {
    seed: u64,
}

impl Default for FallbackGenerator {
    fn default() -> Self {
        Self::new(fastrand::u64(..))
    }
}

impl FallbackGenerator {
    pub const fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Lookup-table base price for `symbol`.
    pub fn base_price(symbol: &Symbol) -> f64 {
        BASE_PRICES
            .iter()
            .find(|(known, _)| *known == symbol.as_str())
            .map_or(DEFAULT_BASE_PRICE, |(_, price)| *price)
    }

    /// Synthetic quote whose price lies in `[0.8 * base, 1.05 * base]`.
    pub fn fallback_quote(&self, symbol: &Symbol) -> Quote {
        let mut rng = self.rng_for(symbol);
        let base = Self::base_price(symbol);
        let variation = (rng.f64() * 2.0 - 1.0) * MAX_VARIATION * base;
        let price = round_cents((base + variation).max(base * PRICE_FLOOR));
        let change = round_cents(price - base);

        Quote {
            symbol: symbol.clone(),
            market: symbol.market(),
            price,
            change,
            change_percent: round_cents(change / base * 100.0),
            volume: Some(rng.u64(1_000_000..11_000_000)),
            total_volume: None,
            market_cap: None,
            high: None,
            low: None,
            open: None,
            previous_close: Some(base),
            company_name: Some(if symbol.market().is_taiwan() {
                format!("{symbol} 公司")
            } else {
                format!("{symbol} Inc.")
            }),
            high_52_week: None,
            low_52_week: None,
            last_updated: None,
        }
    }

    /// Thirty synthetic daily bars ending today in the symbol's exchange calendar.
    pub fn fallback_history(&self, symbol: &Symbol) -> Vec<HistoricalBar> {
        self.fallback_history_until(symbol, FALLBACK_HISTORY_DAYS, symbol.market().local_today())
    }

    /// `days` synthetic daily bars ending on `end`, ascending by date.
    pub fn fallback_history_until(
        &self,
        symbol: &Symbol,
        days: usize,
        end: Date,
    ) -> Vec<HistoricalBar> {
        let mut rng = self.rng_for(symbol);
        let base = Self::base_price(symbol);

        (0..days)
            .rev()
            .filter_map(|offset| {
                let date = end.checked_sub(Duration::days(offset as i64))?;
                let close = round_cents(base * (1.0 + (rng.f64() - 0.5) * 2.0 * MAX_VARIATION));
                let open = round_cents(close * (1.0 + (rng.f64() - 0.5) * 0.02));
                let high = round_cents(open.max(close) * (1.0 + rng.f64() * 0.01));
                let low = round_cents(open.min(close) * (1.0 - rng.f64() * 0.01));
                let volume = rng.u64(1_000_000..11_000_000);
                HistoricalBar::new(date, open, high, low, close, volume).ok()
            })
            .collect()
    }

    fn rng_for(&self, symbol: &Symbol) -> fastrand::Rng {
        fastrand::Rng::with_seed(self.seed ^ symbol_seed(symbol))
    }
}

fn symbol_seed(symbol: &Symbol) -> u64 {
    symbol.as_str().bytes().fold(0_u64, |acc, byte| {
        acc.wrapping_mul(33).wrapping_add(byte as u64)
    })
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
