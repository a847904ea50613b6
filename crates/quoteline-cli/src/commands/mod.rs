mod history;
mod preload;
mod quote;
mod stats;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use quoteline_core::{ClientConfig, MarketDataClient};
use quoteline_warehouse::{Warehouse, WarehouseConfig};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Plain-text rendering of a command's result.
#[derive(Debug)]
pub struct Table {
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<&'static str>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }
}

pub struct CommandResult {
    pub data: Value,
    pub table: Table,
    pub warnings: Vec<String>,
}

impl CommandResult {
    pub fn ok(data: Value, table: Table) -> Self {
        Self {
            data,
            table,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let config = client_config(cli)?;

    match &cli.command {
        Command::Quote(args) => quote::run(args, &build_client(cli, config)?).await,
        Command::History(args) => history::run(args, &build_client(cli, config)?).await,
        Command::Preload => preload::run(&build_client(cli, config)?).await,
        Command::Stats(args) => stats::run(args, &build_client(cli, config)?).await,
    }
}

/// Environment configuration with command-line overrides applied.
fn client_config(cli: &Cli) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.http_timeout = Duration::from_millis(timeout_ms);
    }
    config.validate()?;
    Ok(config)
}

fn build_client(cli: &Cli, config: ClientConfig) -> Result<MarketDataClient, CliError> {
    let mut builder = MarketDataClient::builder().with_config(config);
    if cli.store {
        builder = builder.with_store(Arc::new(open_warehouse(cli.home.as_deref())?));
    }
    Ok(builder.build()?)
}

fn open_warehouse(home: Option<&Path>) -> Result<Warehouse, CliError> {
    let config = match home {
        Some(home) => WarehouseConfig::at_home(home),
        None => WarehouseConfig::default(),
    };
    tracing::debug!(path = %config.db_path.display(), "opening snapshot store");
    Ok(Warehouse::open(config)?)
}

fn format_price(value: f64) -> String {
    format!("{value:.2}")
}

fn format_optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| String::from("-"), |value| value.to_string())
}
