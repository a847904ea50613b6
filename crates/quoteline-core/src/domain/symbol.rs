use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, UtcOffset};

use crate::ValidationError;

const MAX_SYMBOL_LEN: usize = 15;
const TAIWAN_CODE_LEN: usize = 4;
const TAIWAN_SUFFIXES: [&str; 2] = [".TWO", ".TW"];

/// Taipei Exchange codes that do not follow the leading-`6` rule.
pub const OTC_SYMBOLS: [&str; 10] = [
    "6547", "6180", "4938", "3034", "6415", "6669", "4904", "6176", "3711", "6239",
];

/// Frequently requested TSE-listed codes.
pub const POPULAR_TSE_SYMBOLS: [&str; 15] = [
    "2330", "2317", "2454", "2881", "0050", "0056", "2412", "1301", "2303", "2002", "1216",
    "2886", "2891", "2382", "2308",
];

/// Frequently requested US tickers.
pub const POPULAR_US_SYMBOLS: [&str; 10] = [
    "AAPL", "GOOGL", "MSFT", "TSLA", "AMZN", "NVDA", "META", "NFLX", "AMD", "CRM",
];

/// Exchange segment a symbol trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    Us,
    Tse,
    Otc,
}

impl Market {
    /// Classify a normalized symbol by its shape.
    pub fn classify(symbol: &str) -> Self {
        if !is_taiwan_code(symbol) {
            return Self::Us;
        }

        if symbol.starts_with('6') || OTC_SYMBOLS.contains(&symbol) {
            Self::Otc
        } else {
            Self::Tse
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Us => "us",
            Self::Tse => "tse",
            Self::Otc => "otc",
        }
    }

    pub const fn is_taiwan(self) -> bool {
        matches!(self, Self::Tse | Self::Otc)
    }

    /// Offset used for exchange-local calendar days.
    pub fn utc_offset(self) -> UtcOffset {
        match self {
            Self::Us => UtcOffset::UTC,
            Self::Tse | Self::Otc => taipei_offset(),
        }
    }

    /// Current calendar day on this market's clock.
    pub fn local_today(self) -> Date {
        OffsetDateTime::now_utc().to_offset(self.utc_offset()).date()
    }
}

impl Display for Market {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized market symbol.
///
/// US tickers are uppercase text starting with a letter. Taiwan codes are
/// exactly four digits; `2330.TW` and `2330.TWO` normalize to `2330`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a symbol to uppercase.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let mut normalized = trimmed.to_ascii_uppercase();
        for suffix in TAIWAN_SUFFIXES {
            if let Some(code) = normalized.strip_suffix(suffix) {
                if is_taiwan_code(code) {
                    normalized = code.to_owned();
                }
                break;
            }
        }

        if is_taiwan_code(&normalized) {
            return Ok(Self(normalized));
        }

        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_SYMBOL_LEN,
            });
        }

        if let Some(first) = normalized.chars().next() {
            if !first.is_ascii_alphabetic() {
                return Err(ValidationError::SymbolInvalidStart { value: normalized });
            }
        }

        for (index, ch) in normalized.chars().enumerate() {
            let valid = ch.is_ascii_alphanumeric() || ch == '.' || ch == '-';
            if !valid {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn market(&self) -> Market {
        Market::classify(&self.0)
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

fn is_taiwan_code(value: &str) -> bool {
    value.len() == TAIWAN_CODE_LEN && value.bytes().all(|byte| byte.is_ascii_digit())
}

pub(crate) fn taipei_offset() -> UtcOffset {
    UtcOffset::from_hms(8, 0, 0).unwrap_or(UtcOffset::UTC)
}
