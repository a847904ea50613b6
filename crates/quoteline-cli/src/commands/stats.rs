use quoteline_core::MarketDataClient;

use crate::cli::StatsArgs;
use crate::error::CliError;

use super::{CommandResult, Table};

pub async fn run(args: &StatsArgs, client: &MarketDataClient) -> Result<CommandResult, CliError> {
    if !args.symbols.is_empty() {
        client.get_many(&args.symbols).await?;
    }

    let stats = client.cache_stats();
    let mut table = Table::new(vec!["metric", "value"]);
    for (metric, value) in [
        ("cache_size", stats.cache_size.to_string()),
        ("queue_size", stats.queue_size.to_string()),
        ("pending", stats.pending.to_string()),
        ("is_processing", stats.is_processing.to_string()),
        ("hit_rate_%", format!("{:.1}", stats.hit_rate)),
    ] {
        table.push(vec![metric.to_owned(), value]);
    }

    Ok(CommandResult::ok(serde_json::to_value(stats)?, table))
}
