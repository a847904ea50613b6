use serde_json::json;

use quoteline_core::MarketDataClient;

use crate::error::CliError;

use super::{CommandResult, Table};

pub async fn run(client: &MarketDataClient) -> Result<CommandResult, CliError> {
    let loaded = client
        .preload_popular()
        .await
        .map_err(|error| CliError::Command(format!("preload task failed: {error}")))?;
    let stats = client.cache_stats();

    let mut table = Table::new(vec!["loaded", "cache_size", "hit_rate_%"]);
    table.push(vec![
        loaded.to_string(),
        stats.cache_size.to_string(),
        format!("{:.1}", stats.hit_rate),
    ]);

    let data = json!({
        "loaded": loaded,
        "stats": stats,
    });
    Ok(CommandResult::ok(data, table))
}
