use serde::Serialize;

use quoteline_core::{format_date, HistoricalBar, MarketDataClient, Sourced, Symbol};

use crate::cli::HistoryArgs;
use crate::error::CliError;

use super::{format_price, CommandResult, Table};

#[derive(Debug, Serialize)]
struct HistoryResponseData {
    symbol: String,
    history: Sourced<Vec<HistoricalBar>>,
}

pub async fn run(
    args: &HistoryArgs,
    client: &MarketDataClient,
) -> Result<CommandResult, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let history = client.get_history(symbol.as_str(), args.days).await?;

    let mut table = Table::new(vec!["date", "open", "high", "low", "close", "volume"]);
    for bar in history.value() {
        table.push(vec![
            format_date(bar.date),
            format_price(bar.open),
            format_price(bar.high),
            format_price(bar.low),
            format_price(bar.close),
            bar.volume.to_string(),
        ]);
    }

    let warnings = if history.is_fallback() {
        vec![format!(
            "{symbol}: upstream history unavailable, serving fallback bars"
        )]
    } else {
        Vec::new()
    };

    let data = serde_json::to_value(HistoryResponseData {
        symbol: symbol.to_string(),
        history,
    })?;
    Ok(CommandResult::ok(data, table).with_warnings(warnings))
}
