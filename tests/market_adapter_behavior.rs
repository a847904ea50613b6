//! Behaviour tests for symbol classification and the per-market adapters.

use quoteline_core::{
    format_date, minguo_to_date, parse_date, parse_twse_number, Market, MarketAdapter, Symbol,
    TaiwanAdapter, UsAdapter, ValidationError,
};

fn symbol(value: &str) -> Symbol {
    Symbol::parse(value).expect("valid symbol")
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn taiwan_codes_are_split_between_boards() {
    assert_eq!(symbol("2330").market(), Market::Tse);
    assert_eq!(symbol("0050").market(), Market::Tse);
    assert_eq!(symbol("6547").market(), Market::Otc);
    assert_eq!(symbol("3034").market(), Market::Otc);
    assert_eq!(symbol("6999").market(), Market::Otc);
}

#[test]
fn anything_else_is_a_us_ticker() {
    assert_eq!(symbol("AAPL").market(), Market::Us);
    assert_eq!(symbol("brk-b").market(), Market::Us);
    assert_eq!(symbol("T").market(), Market::Us);
    assert!(!Market::Us.is_taiwan());
}

#[test]
fn exchange_suffixes_normalize_to_the_bare_code() {
    assert_eq!(symbol("2330.TW").as_str(), "2330");
    assert_eq!(symbol("6547.two").as_str(), "6547");
    assert_eq!(symbol(" msft ").as_str(), "MSFT");
}

#[test]
fn malformed_symbols_are_rejected() {
    assert_eq!(Symbol::parse(""), Err(ValidationError::EmptySymbol));
    assert!(matches!(
        Symbol::parse("12345"),
        Err(ValidationError::SymbolInvalidStart { .. })
    ));
    assert!(matches!(
        Symbol::parse("AA PL"),
        Err(ValidationError::SymbolInvalidChar { ch: ' ', index: 2 })
    ));
    assert!(matches!(
        Symbol::parse("ABCDEFGHIJKLMNOP"),
        Err(ValidationError::SymbolTooLong { len: 16, max: 15 })
    ));
}

// ============================================================================
// TWSE value parsing
// ============================================================================

#[test]
fn minguo_dates_convert_to_the_standard_calendar() {
    let date = minguo_to_date("113/05/10").expect("valid minguo date");
    assert_eq!(format_date(date), "2024-05-10");

    assert_eq!(
        minguo_to_date("112/12/29"),
        Some(parse_date("2023-12-29").expect("valid date"))
    );
    assert_eq!(minguo_to_date("113/02/30"), None);
    assert_eq!(minguo_to_date("2024-05-10"), None);
}

#[test]
fn twse_numbers_drop_separators_and_placeholders() {
    assert_eq!(parse_twse_number("1,234,567"), Some(1_234_567.0));
    assert_eq!(parse_twse_number("+5.50"), Some(5.5));
    assert_eq!(parse_twse_number("-0.75"), Some(-0.75));
    assert_eq!(parse_twse_number("-"), None);
    assert_eq!(parse_twse_number("--"), None);
    assert_eq!(parse_twse_number(""), None);
}

// ============================================================================
// Request building
// ============================================================================

#[test]
fn yahoo_quote_url_encodes_the_symbol_list() {
    let calls = UsAdapter::default().quote_requests(&[symbol("AAPL"), symbol("MSFT")]);

    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].request.url,
        "https://query1.finance.yahoo.com/v7/finance/quote?symbols=AAPL%2CMSFT"
    );
    assert_eq!(calls[0].symbols, vec![symbol("AAPL"), symbol("MSFT")]);
}

#[test]
fn twse_quote_urls_are_grouped_by_board() {
    let calls =
        TaiwanAdapter::default().quote_requests(&[symbol("2330"), symbol("3034"), symbol("0050")]);

    let urls: Vec<&str> = calls.iter().map(|call| call.request.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://mis.twse.com.tw/stock/api/getStockInfo.jsp?ex_ch=tse_2330.tw|tse_0050.tw&json=1&delay=0",
            "https://mis.twse.com.tw/stock/api/getStockInfo.jsp?ex_ch=otc_3034.tw&json=1&delay=0",
        ]
    );
}

#[test]
fn no_symbols_means_no_requests() {
    assert!(UsAdapter::default().quote_requests(&[]).is_empty());
    assert!(TaiwanAdapter::default().quote_requests(&[]).is_empty());
}

#[test]
fn twse_history_walks_back_one_month_per_request() {
    let today = parse_date("2024-02-15").expect("valid date");

    let requests = TaiwanAdapter::default().history_requests(&symbol("2330"), 30, today);

    let dates: Vec<&str> = requests
        .iter()
        .filter_map(|request| request.url.split("date=").nth(1))
        .map(|rest| &rest[..8])
        .collect();
    assert_eq!(dates, vec!["20240201", "20240101", "20231201", "20231101"]);
}

// ============================================================================
// Response parsing
// ============================================================================

#[test]
fn twse_quote_without_a_trade_reports_zero_price() {
    let body = r#"{"msgArray":[
        {"c":"2330","n":"台積電","z":"-","y":"580.00","tv":"-","v":"12,345","tlong":"1715319000000"}
    ],"rtcode":"0000","rtmessage":"OK"}"#;

    let quotes = TaiwanAdapter::default().parse_quotes(body).expect("parses");

    assert_eq!(quotes.len(), 1);
    let quote = &quotes[0];
    assert_eq!(quote.market, Market::Tse);
    assert_eq!(quote.price, 0.0);
    assert_eq!(quote.previous_close, Some(580.0));
    assert_eq!(quote.volume, None);
    assert_eq!(quote.total_volume, Some(12_345));
    assert_eq!(quote.company_name.as_deref(), Some("台積電"));
    assert_eq!(quote.last_updated.as_deref(), Some("2024-05-10 13:30:00"));
}

#[test]
fn yahoo_quotes_keep_only_parseable_symbols() {
    let body = r#"{"quoteResponse":{"result":[
        {"symbol":"AAPL","regularMarketPrice":189.5},
        {"symbol":"","regularMarketPrice":1.0}
    ],"error":null}}"#;

    let quotes = UsAdapter::default().parse_quotes(body).expect("parses");

    assert_eq!(quotes.len(), 1);
    assert_eq!(quotes[0].symbol, symbol("AAPL"));
    assert_eq!(quotes[0].market, Market::Us);
}

#[test]
fn twse_history_drops_suspended_sessions() {
    let body = r#"{"stat":"OK","data":[
        ["113/05/09","20,000,000","11,500,000,000","570.00","576.00","569.00","575.00","+3.00","25,000"],
        ["113/05/10","0","0","--","--","--","--"," 0.00","0"]
    ]}"#;

    let bars = TaiwanAdapter::default()
        .parse_history(body)
        .expect("parses");

    assert_eq!(bars.len(), 1);
    assert_eq!(format_date(bars[0].date), "2024-05-09");
    assert_eq!(bars[0].close, 575.0);
}

#[test]
fn twse_error_code_is_rejected() {
    let body = r#"{"msgArray":[],"rtcode":"5001","rtmessage":"bad channel"}"#;

    let error = TaiwanAdapter::default()
        .parse_quotes(body)
        .expect_err("rejected");

    assert_eq!(error.code(), "source.rejected");
    assert!(error.message().contains("5001"));
}
