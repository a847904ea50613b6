//! Client tuning knobs.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::CACHE_DURATION;
use crate::retry::RetryPolicy;
use crate::ValidationError;

/// Default number of symbols per upstream request.
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// Default upper bound on a caller's wait for a queued symbol.
pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(10);
/// Default pause between consecutive upstream chunks.
pub const DEFAULT_CHUNK_PAUSE: Duration = Duration::from_millis(200);
/// Default cap on unique symbols accepted by one `get_many` call.
pub const DEFAULT_MAX_REQUEST_SYMBOLS: usize = 50;
/// Longest history window `get_history` accepts.
pub const MAX_HISTORY_DAYS: usize = 365;

const CACHE_TTL_KEY: &str = "QUOTELINE_CACHE_TTL_MS";
const BATCH_SIZE_KEY: &str = "QUOTELINE_BATCH_SIZE";
const PENDING_TIMEOUT_KEY: &str = "QUOTELINE_PENDING_TIMEOUT_MS";
const CHUNK_PAUSE_KEY: &str = "QUOTELINE_CHUNK_PAUSE_MS";
const RETRY_ATTEMPTS_KEY: &str = "QUOTELINE_RETRY_ATTEMPTS";
const RETRY_BASE_KEY: &str = "QUOTELINE_RETRY_BASE_MS";
const MAX_REQUEST_SYMBOLS_KEY: &str = "QUOTELINE_MAX_REQUEST_SYMBOLS";

/// Configuration for [`crate::MarketDataClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Freshness window for cached quotes.
    pub cache_ttl: Duration,
    pub batch_size: usize,
    /// Measured from the moment a symbol is enqueued.
    pub pending_timeout: Duration,
    pub chunk_pause: Duration,
    pub retry: RetryPolicy,
    pub max_request_symbols: usize,
    /// Per-request timeout handed to the HTTP client.
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache_ttl: CACHE_DURATION,
            batch_size: DEFAULT_BATCH_SIZE,
            pending_timeout: DEFAULT_PENDING_TIMEOUT,
            chunk_pause: DEFAULT_CHUNK_PAUSE,
            retry: RetryPolicy::default(),
            max_request_symbols: DEFAULT_MAX_REQUEST_SYMBOLS,
            http_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by any `QUOTELINE_*` variables set in the environment.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse_var::<u64>(&lookup, CACHE_TTL_KEY)? {
            config.cache_ttl = Duration::from_millis(ms);
        }
        if let Some(size) = parse_var::<usize>(&lookup, BATCH_SIZE_KEY)? {
            config.batch_size = size;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, PENDING_TIMEOUT_KEY)? {
            config.pending_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, CHUNK_PAUSE_KEY)? {
            config.chunk_pause = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, RETRY_ATTEMPTS_KEY)? {
            config.retry.max_attempts = attempts;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, RETRY_BASE_KEY)? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(max) = parse_var::<usize>(&lookup, MAX_REQUEST_SYMBOLS_KEY)? {
            config.max_request_symbols = max;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |key: &str, value: String| ValidationError::InvalidConfig {
            key: key.to_owned(),
            value,
        };

        if self.cache_ttl.is_zero() {
            return Err(invalid(CACHE_TTL_KEY, String::from("0")));
        }
        if self.batch_size == 0 {
            return Err(invalid(BATCH_SIZE_KEY, String::from("0")));
        }
        if self.pending_timeout.is_zero() {
            return Err(invalid(PENDING_TIMEOUT_KEY, String::from("0")));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid(RETRY_ATTEMPTS_KEY, String::from("0")));
        }
        if self.max_request_symbols == 0 {
            return Err(invalid(MAX_REQUEST_SYMBOLS_KEY, String::from("0")));
        }
        Ok(())
    }

    pub(crate) fn http_timeout_ms(&self) -> u64 {
        u64::try_from(self.http_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ValidationError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|_| ValidationError::InvalidConfig {
            key: key.to_owned(),
            value: raw,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_constants() {
        let config = ClientConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_millis(300_000));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.pending_timeout, Duration::from_secs(10));
        assert_eq!(config.chunk_pause, Duration::from_millis(200));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1_000));
        assert_eq!(config.max_request_symbols, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_are_applied() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("QUOTELINE_BATCH_SIZE", "5"),
            ("QUOTELINE_RETRY_BASE_MS", "250"),
            ("QUOTELINE_CACHE_TTL_MS", " "),
        ]))
        .expect("valid overrides");

        assert_eq!(config.batch_size, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.cache_ttl, CACHE_DURATION);
    }

    #[test]
    fn unparseable_and_zero_values_are_rejected() {
        let error = ClientConfig::from_lookup(lookup(&[("QUOTELINE_CHUNK_PAUSE_MS", "soon")]))
            .expect_err("must fail");
        assert_eq!(
            error,
            ValidationError::InvalidConfig {
                key: String::from("QUOTELINE_CHUNK_PAUSE_MS"),
                value: String::from("soon"),
            }
        );

        let error = ClientConfig::from_lookup(lookup(&[("QUOTELINE_BATCH_SIZE", "0")]))
            .expect_err("must fail");
        assert!(matches!(error, ValidationError::InvalidConfig { key, .. } if key == "QUOTELINE_BATCH_SIZE"));
    }
}
