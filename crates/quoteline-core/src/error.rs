use thiserror::Error;

/// Input validation errors exposed by `quoteline-core`.
///
/// These are the only errors that reach callers of the client; upstream and
/// data failures resolve to fallback quotes instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter or be a 4-digit Taiwan code: '{value}'")]
    SymbolInvalidStart { value: String },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("symbol list cannot be empty")]
    EmptyBatch,
    #[error("symbol list has {count} unique symbols, max is {max}")]
    TooManySymbols { count: usize, max: usize },
    #[error("history length must be between 1 and {max} days, got {days}")]
    InvalidHistoryDays { days: usize, max: usize },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("invalid calendar date '{value}'")]
    InvalidDate { value: String },

    #[error("invalid configuration value for {key}: '{value}'")]
    InvalidConfig { key: String, value: String },
}
