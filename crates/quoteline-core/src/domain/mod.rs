//! # Domain Models
//!
//! Canonical quote types shared by the cache, the adapters, and the store.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated ticker (US text or 4-digit Taiwan code) |
//! | [`Market`] | Exchange segment derived from symbol shape |
//! | [`Quote`] | Point-in-time price snapshot |
//! | [`HistoricalBar`] | Daily OHLCV bar |
//! | [`Sourced`] | Provenance tag: live, fallback, or stored |

mod models;
mod symbol;

pub use models::{format_date, parse_date, HistoricalBar, Quote, Sourced};
pub(crate) use models::calendar_date;
pub use symbol::{Market, Symbol, OTC_SYMBOLS, POPULAR_TSE_SYMBOLS, POPULAR_US_SYMBOLS};
pub(crate) use symbol::taipei_offset;
