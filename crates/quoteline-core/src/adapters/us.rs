use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::{Date, Duration, OffsetDateTime, Time};

use super::{MarketAdapter, QuoteCall};
use crate::http_client::HttpRequest;
use crate::source::SourceError;
use crate::{HistoricalBar, Quote, Symbol};

const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Yahoo Finance quote and chart adapter for US tickers.
#[derive(Debug, Clone)]
pub struct UsAdapter {
    base_url: String,
    timeout_ms: u64,
}

impl Default for UsAdapter {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl UsAdapter {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            base_url: String::from(YAHOO_BASE_URL),
            timeout_ms,
        }
    }

    fn request(&self, url: String) -> HttpRequest {
        HttpRequest::get(url)
            .with_header("referer", "https://finance.yahoo.com/")
            .with_timeout_ms(self.timeout_ms)
    }
}

impl MarketAdapter for UsAdapter {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    fn quote_requests(&self, symbols: &[Symbol]) -> Vec<QuoteCall> {
        if symbols.is_empty() {
            return Vec::new();
        }

        let symbols_param = symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/v7/finance/quote?symbols={}",
            self.base_url,
            urlencoding::encode(&symbols_param)
        );

        vec![QuoteCall {
            request: self.request(url),
            symbols: symbols.to_vec(),
        }]
    }

    fn parse_quotes(&self, body: &str) -> Result<Vec<Quote>, SourceError> {
        let response: YahooQuoteResponse = serde_json::from_str(body)
            .map_err(|e| SourceError::malformed(format!("failed to parse yahoo response: {e}")))?;

        if let Some(error) = response.quote_response.error {
            if !error.is_null() {
                return Err(SourceError::rejected(format!("yahoo API error: {error}")));
            }
        }

        Ok(response
            .quote_response
            .result
            .into_iter()
            .filter_map(normalize_quote)
            .collect())
    }

    fn history_requests(&self, symbol: &Symbol, days: usize, today: Date) -> Vec<HttpRequest> {
        // Weekends and holidays: ask for enough calendar days to cover `days` sessions.
        let calendar_days = (days as i64) * 7 / 5 + 7;
        let end = today.with_time(Time::MIDNIGHT).assume_utc() + Duration::days(1);
        let start = end - Duration::days(calendar_days);

        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&includePrePost=false",
            self.base_url,
            urlencoding::encode(symbol.as_str()),
            start.unix_timestamp(),
            end.unix_timestamp()
        );
        vec![self.request(url)]
    }

    fn parse_history(&self, body: &str) -> Result<Vec<HistoricalBar>, SourceError> {
        let response: YahooChartResponse = serde_json::from_str(body)
            .map_err(|e| SourceError::malformed(format!("failed to parse yahoo chart: {e}")))?;

        if let Some(error) = response.chart.error {
            if !error.is_null() {
                return Err(SourceError::rejected(format!("yahoo chart API error: {error}")));
            }
        }

        let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
            return Err(SourceError::not_found("no chart data in response"));
        };
        let timestamps = result.timestamp.unwrap_or_default();
        let Some(quote) = result.indicators.quote.into_iter().next() else {
            return Err(SourceError::malformed("chart response has no quote indicators"));
        };

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, ts) in timestamps.into_iter().enumerate() {
            let Some(close) = value_at(&quote.close, i) else {
                continue;
            };
            let date = OffsetDateTime::from_unix_timestamp(ts)
                .map_err(|e| SourceError::malformed(format!("invalid timestamp {ts}: {e}")))?
                .date();
            let open = value_at(&quote.open, i).unwrap_or(close);
            let high = value_at(&quote.high, i).unwrap_or(close);
            let low = value_at(&quote.low, i).unwrap_or(close);
            let volume = quote
                .volume
                .get(i)
                .copied()
                .flatten()
                .map_or(0, |v| v.max(0) as u64);

            let bar = HistoricalBar::new(date, open, high, low, close, volume)
                .map_err(|e| SourceError::malformed(e.to_string()))?;
            bars.push(bar);
        }

        Ok(bars)
    }
}

fn normalize_quote(data: YahooQuoteData) -> Option<Quote> {
    let symbol = Symbol::parse(&data.symbol).ok()?;
    let mut quote = Quote::new(
        symbol,
        data.regular_market_price.unwrap_or(0.0),
        data.regular_market_change.unwrap_or(0.0),
        data.regular_market_change_percent.unwrap_or(0.0),
    )
    .ok()?;

    quote.volume = data.regular_market_volume.map(|v| v.max(0) as u64);
    quote.market_cap = data.market_cap;
    quote.high = data.regular_market_day_high;
    quote.low = data.regular_market_day_low;
    quote.open = data.regular_market_open;
    quote.previous_close = data.regular_market_previous_close;
    quote.company_name = data.long_name.or(data.short_name);
    quote.high_52_week = data.fifty_two_week_high;
    quote.low_52_week = data.fifty_two_week_low;
    quote.last_updated = data
        .regular_market_time
        .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
        .and_then(|ts| ts.format(&Rfc3339).ok());
    Some(quote)
}

fn value_at(values: &[Option<f64>], index: usize) -> Option<f64> {
    values.get(index).copied().flatten()
}

#[derive(Debug, Clone, Deserialize)]
struct YahooQuoteResponse {
    #[serde(rename = "quoteResponse")]
    quote_response: YahooQuoteResponseData,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooQuoteResponseData {
    #[serde(default)]
    result: Vec<YahooQuoteData>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooQuoteData {
    symbol: String,
    regular_market_price: Option<f64>,
    regular_market_change: Option<f64>,
    regular_market_change_percent: Option<f64>,
    regular_market_volume: Option<i64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_open: Option<f64>,
    regular_market_previous_close: Option<f64>,
    regular_market_time: Option<i64>,
    market_cap: Option<f64>,
    fifty_two_week_high: Option<f64>,
    fifty_two_week_low: Option<f64>,
    long_name: Option<String>,
    short_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: YahooChartIndicators,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartIndicators {
    quote: Vec<YahooChartQuote>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}
