use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::{Date, Month};

use crate::{Market, Symbol, ValidationError};

/// Point-in-time quote snapshot.
///
/// A quote is never mutated after it lands in the cache; a newer fetch
/// produces a new value that replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub market: Market,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_volume: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_52_week: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_52_week: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl Quote {
    /// Build a quote with the required price fields; optional fields start empty.
    pub fn new(
        symbol: Symbol,
        price: f64,
        change: f64,
        change_percent: f64,
    ) -> Result<Self, ValidationError> {
        ensure_finite("price", price)?;
        ensure_non_negative("price", price)?;
        ensure_finite("change", change)?;
        ensure_finite("change_percent", change_percent)?;

        Ok(Self {
            market: symbol.market(),
            symbol,
            price,
            change,
            change_percent,
            volume: None,
            total_volume: None,
            market_cap: None,
            high: None,
            low: None,
            open: None,
            previous_close: None,
            company_name: None,
            high_52_week: None,
            low_52_week: None,
            last_updated: None,
        })
    }
}

/// One trading day of OHLCV data in exchange-local calendar terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBar {
    #[serde(serialize_with = "serialize_date", deserialize_with = "deserialize_date")]
    pub date: Date,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl HistoricalBar {
    pub fn new(
        date: Date,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Result<Self, ValidationError> {
        for (field, value) in [("open", open), ("high", high), ("low", low), ("close", close)] {
            ensure_finite(field, value)?;
            ensure_non_negative(field, value)?;
        }

        Ok(Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// Provenance of a value handed back to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "data", rename_all = "snake_case")]
pub enum Sourced<T> {
    /// Fetched from an upstream provider.
    Live(T),
    /// Synthesized because upstream data was unavailable.
    Fallback(T),
    /// Read from the persistent snapshot store.
    Stored(T),
}

impl<T> Sourced<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Live(value) | Self::Fallback(value) | Self::Stored(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Live(value) | Self::Fallback(value) | Self::Stored(value) => value,
        }
    }

    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Live(_) => "live",
            Self::Fallback(_) => "fallback",
            Self::Stored(_) => "stored",
        }
    }
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<Date, ValidationError> {
    let invalid = || ValidationError::InvalidDate {
        value: input.to_owned(),
    };

    let mut parts = input.trim().splitn(3, '-');
    let year = parts
        .next()
        .and_then(|part| part.parse::<i32>().ok())
        .ok_or_else(invalid)?;
    let month = parts
        .next()
        .and_then(|part| part.parse::<u8>().ok())
        .ok_or_else(invalid)?;
    let day = parts
        .next()
        .and_then(|part| part.parse::<u8>().ok())
        .ok_or_else(invalid)?;

    calendar_date(year, month, day).ok_or_else(invalid)
}

pub(crate) fn calendar_date(year: i32, month: u8, day: u8) -> Option<Date> {
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

fn ensure_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonFiniteValue { field })
    }
}

fn ensure_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::NegativeValue { field })
    }
}

fn serialize_date<S>(date: &Date, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_date(*date))
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<Date, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    parse_date(&value).map_err(D::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_derives_market_from_symbol() {
        let quote = Quote::new(Symbol::parse("6547").expect("valid"), 300.0, 1.5, 0.5)
            .expect("valid quote");
        assert_eq!(quote.market, Market::Otc);
    }

    #[test]
    fn quote_rejects_non_finite_price() {
        let err = Quote::new(Symbol::parse("AAPL").expect("valid"), f64::NAN, 0.0, 0.0)
            .expect_err("must fail");
        assert_eq!(err, ValidationError::NonFiniteValue { field: "price" });
    }

    #[test]
    fn date_round_trips_through_text() {
        let date = parse_date("2024-05-10").expect("valid date");
        assert_eq!(format_date(date), "2024-05-10");
        assert!(parse_date("2024-02-30").is_err());
    }

    #[test]
    fn sourced_serializes_with_provenance_tag() {
        let quote = Quote::new(Symbol::parse("AAPL").expect("valid"), 150.0, 0.0, 0.0)
            .expect("valid quote");
        let json = serde_json::to_value(Sourced::Fallback(quote)).expect("serializable");
        assert_eq!(json["source"], "fallback");
        assert_eq!(json["data"]["symbol"], "AAPL");
        assert_eq!(json["data"]["market"], "us");
    }
}
