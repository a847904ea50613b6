use serde::Deserialize;
use time::{Date, Month, OffsetDateTime};

use super::{MarketAdapter, QuoteCall};
use crate::domain::{calendar_date, taipei_offset};
use crate::http_client::HttpRequest;
use crate::source::SourceError;
use crate::{HistoricalBar, Market, Quote, Symbol};

const MIS_BASE_URL: &str = "https://mis.twse.com.tw";
const TWSE_BASE_URL: &str = "https://www.twse.com.tw";
const MINGUO_OFFSET: i32 = 1911;
const SUCCESS_RTCODE: &str = "0000";
const SUCCESS_STAT: &str = "OK";

/// Taiwan Stock Exchange adapter covering both TSE and OTC codes.
///
/// Quotes come from the MIS endpoint, where every numeric field is a string.
/// History comes from the monthly `STOCK_DAY` report with Minguo dates.
#[derive(Debug, Clone)]
pub struct TaiwanAdapter {
    quote_base_url: String,
    history_base_url: String,
    timeout_ms: u64,
}

impl Default for TaiwanAdapter {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl TaiwanAdapter {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            quote_base_url: String::from(MIS_BASE_URL),
            history_base_url: String::from(TWSE_BASE_URL),
            timeout_ms,
        }
    }

    fn group_call(&self, market: Market, symbols: Vec<Symbol>) -> QuoteCall {
        let channels = symbols
            .iter()
            .map(|symbol| format!("{}_{}.tw", market.as_str(), symbol.as_str()))
            .collect::<Vec<_>>()
            .join("|");
        let url = format!(
            "{}/stock/api/getStockInfo.jsp?ex_ch={}&json=1&delay=0",
            self.quote_base_url, channels
        );

        QuoteCall {
            request: HttpRequest::get(url).with_timeout_ms(self.timeout_ms),
            symbols,
        }
    }
}

impl MarketAdapter for TaiwanAdapter {
    fn name(&self) -> &'static str {
        "twse"
    }

    fn quote_requests(&self, symbols: &[Symbol]) -> Vec<QuoteCall> {
        let (otc, tse): (Vec<Symbol>, Vec<Symbol>) = symbols
            .iter()
            .cloned()
            .partition(|symbol| symbol.market() == Market::Otc);

        let mut calls = Vec::with_capacity(2);
        if !tse.is_empty() {
            calls.push(self.group_call(Market::Tse, tse));
        }
        if !otc.is_empty() {
            calls.push(self.group_call(Market::Otc, otc));
        }
        calls
    }

    fn parse_quotes(&self, body: &str) -> Result<Vec<Quote>, SourceError> {
        let response: MisResponse = serde_json::from_str(body)
            .map_err(|e| SourceError::malformed(format!("failed to parse twse response: {e}")))?;

        if response.rtcode.as_deref() != Some(SUCCESS_RTCODE) {
            return Err(SourceError::rejected(format!(
                "twse rtcode {}: {}",
                response.rtcode.as_deref().unwrap_or("<missing>"),
                response.rtmessage.as_deref().unwrap_or("no message")
            )));
        }

        Ok(response
            .msg_array
            .into_iter()
            .filter_map(normalize_quote)
            .collect())
    }

    fn history_requests(&self, symbol: &Symbol, days: usize, today: Date) -> Vec<HttpRequest> {
        // Roughly 20 sessions per month; two spare months cover holidays.
        let months = days / 15 + 2;
        let mut year = today.year();
        let mut month = today.month();

        let mut requests = Vec::with_capacity(months);
        for _ in 0..months {
            let url = format!(
                "{}/exchangeReport/STOCK_DAY?response=json&date={:04}{:02}01&stockNo={}",
                self.history_base_url,
                year,
                u8::from(month),
                symbol.as_str()
            );
            requests.push(HttpRequest::get(url).with_timeout_ms(self.timeout_ms));

            if month == Month::January {
                year -= 1;
            }
            month = month.previous();
        }
        requests
    }

    fn parse_history(&self, body: &str) -> Result<Vec<HistoricalBar>, SourceError> {
        let response: StockDayResponse = serde_json::from_str(body)
            .map_err(|e| SourceError::malformed(format!("failed to parse twse history: {e}")))?;

        if response.stat.as_deref() != Some(SUCCESS_STAT) {
            return Err(SourceError::rejected(format!(
                "twse history stat: {}",
                response.stat.as_deref().unwrap_or("<missing>")
            )));
        }

        let mut bars = Vec::with_capacity(response.data.len());
        for row in &response.data {
            if let Some(bar) = parse_history_row(row)? {
                bars.push(bar);
            }
        }
        Ok(bars)
    }
}

/// Convert a Minguo-calendar date such as `113/05/10` to the standard calendar.
pub fn minguo_to_date(value: &str) -> Option<Date> {
    let mut parts = value.trim().split('/');
    let year = parts.next()?.trim().parse::<i32>().ok()?;
    let month = parts.next()?.trim().parse::<u8>().ok()?;
    let day = parts.next()?.trim().parse::<u8>().ok()?;
    if parts.next().is_some() {
        return None;
    }

    calendar_date(year + MINGUO_OFFSET, month, day)
}

/// Parse a TWSE numeric string, stripping thousands separators and sign markers.
///
/// Placeholders such as `-` or `--` (no trade yet) parse as `None`.
pub fn parse_twse_number(value: &str) -> Option<f64> {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|ch| *ch != ',' && *ch != '+')
        .collect();
    cleaned.parse::<f64>().ok().filter(|number| number.is_finite())
}

/// `None` for sessions without a close, such as suspended trading days.
fn parse_history_row(row: &[String]) -> Result<Option<HistoricalBar>, SourceError> {
    if row.len() < 7 {
        return Err(SourceError::malformed(format!(
            "twse history row has {} columns, expected at least 7",
            row.len()
        )));
    }

    let date = minguo_to_date(&row[0])
        .ok_or_else(|| SourceError::malformed(format!("invalid minguo date '{}'", row[0])))?;
    let Some(close) = parse_twse_number(&row[6]) else {
        return Ok(None);
    };
    let number = |index: usize| parse_twse_number(&row[index]).unwrap_or(close);

    HistoricalBar::new(
        date,
        number(3),
        number(4),
        number(5),
        close,
        parse_twse_number(&row[1]).unwrap_or(0.0).max(0.0) as u64,
    )
    .map(Some)
    .map_err(|e| SourceError::malformed(e.to_string()))
}

fn normalize_quote(entry: MisQuote) -> Option<Quote> {
    let symbol = Symbol::parse(entry.c.as_deref()?).ok()?;
    let field = |value: &Option<String>| value.as_deref().and_then(parse_twse_number);

    let price = field(&entry.z).unwrap_or(0.0);
    let previous_close = field(&entry.y).unwrap_or(0.0);
    let change = price - previous_close;
    let change_percent = if previous_close == 0.0 {
        0.0
    } else {
        change / previous_close * 100.0
    };

    let mut quote = Quote::new(symbol, price, change, change_percent).ok()?;
    quote.previous_close = Some(previous_close);
    quote.open = field(&entry.o);
    quote.high = field(&entry.h);
    quote.low = field(&entry.l);
    quote.volume = field(&entry.tv).map(|v| v.max(0.0) as u64);
    quote.total_volume = field(&entry.v).map(|v| v.max(0.0) as u64);
    quote.company_name = entry
        .n
        .filter(|name| !name.trim().is_empty())
        .or(entry.nf)
        .map(|name| name.trim().to_owned());
    quote.last_updated = entry.tlong.as_deref().and_then(format_taipei_millis);
    Some(quote)
}

/// Render epoch milliseconds as `YYYY-MM-DD HH:MM:SS` in Taipei time.
fn format_taipei_millis(value: &str) -> Option<String> {
    let millis = value.trim().parse::<i64>().ok()?;
    let local = OffsetDateTime::from_unix_timestamp(millis.div_euclid(1_000))
        .ok()?
        .to_offset(taipei_offset());

    Some(format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        local.year(),
        u8::from(local.month()),
        local.day(),
        local.hour(),
        local.minute(),
        local.second()
    ))
}

#[derive(Debug, Clone, Deserialize)]
struct MisResponse {
    #[serde(rename = "msgArray", default)]
    msg_array: Vec<MisQuote>,
    rtcode: Option<String>,
    rtmessage: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct MisQuote {
    c: Option<String>,
    n: Option<String>,
    nf: Option<String>,
    z: Option<String>,
    y: Option<String>,
    o: Option<String>,
    h: Option<String>,
    l: Option<String>,
    tv: Option<String>,
    v: Option<String>,
    tlong: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct StockDayResponse {
    stat: Option<String>,
    #[serde(default)]
    data: Vec<Vec<String>>,
}
