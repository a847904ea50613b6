use serde::Serialize;

use quoteline_core::{MarketDataClient, Quote, Sourced};

use crate::cli::QuoteArgs;
use crate::error::CliError;

use super::{format_optional, format_price, CommandResult, Table};

#[derive(Debug, Serialize)]
struct QuoteResponseData {
    quotes: Vec<Sourced<Quote>>,
}

pub async fn run(args: &QuoteArgs, client: &MarketDataClient) -> Result<CommandResult, CliError> {
    let quotes = client.get_many(&args.symbols).await?;

    let mut table = Table::new(vec![
        "symbol", "market", "price", "change", "change_%", "volume", "source",
    ]);
    let mut warnings = Vec::new();
    for sourced in &quotes {
        let quote = sourced.value();
        if sourced.is_fallback() {
            warnings.push(format!(
                "{}: upstream data unavailable, serving fallback quote",
                quote.symbol
            ));
        }
        table.push(vec![
            quote.symbol.to_string(),
            quote.market.to_string(),
            format_price(quote.price),
            format_price(quote.change),
            format_price(quote.change_percent),
            format_optional(quote.volume),
            sourced.label().to_owned(),
        ]);
    }

    let data = serde_json::to_value(QuoteResponseData { quotes })?;
    Ok(CommandResult::ok(data, table).with_warnings(warnings))
}
