//! CLI argument definitions for quoteline.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `quote` | Latest quotes for one or more symbols |
//! | `history` | Daily OHLCV bars for one symbol |
//! | `preload` | Warm the cache with popular symbols |
//! | `stats` | Cache and queue telemetry |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--store` | `false` | Consult the DuckDB snapshot store first |
//! | `--home` | `$QUOTELINE_HOME` | Data directory for the snapshot store |
//! | `--log-level` | `warn` | Log filter when `RUST_LOG` is unset |
//!
//! # Examples
//!
//! ```bash
//! quoteline quote AAPL 2330 6547.TWO --pretty
//! quoteline history 2330 --days 60 --format table
//! quoteline --store quote AAPL MSFT 2330
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Cached, batched quotes for US and Taiwan equities.
#[derive(Debug, Parser)]
#[command(
    name = "quoteline",
    author,
    version,
    about = "Cached, batched quotes for US and Taiwan equities",
    long_about = "quoteline fetches quotes from Yahoo Finance (US) and TWSE (Taiwan) through a \
shared cache that batches and de-duplicates upstream calls.\n\
\n\
Upstream outages never fail a command: affected symbols are served as synthetic \
fallback quotes and marked with source \"fallback\".\n\
\n\
Use 'quoteline <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Consult the DuckDB snapshot store before upstream providers.
    #[arg(long, global = true, default_value_t = false)]
    pub store: bool,

    /// Data directory holding the snapshot store (default: $QUOTELINE_HOME, then ~/.quoteline).
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set (e.g. info, quoteline_core=debug).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Symbols per upstream request.
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    /// Per-request upstream timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned text columns for terminal display.
    Table,
    /// Single JSON document.
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch latest quotes for one or more symbols.
    ///
    /// Duplicate symbols are answered once. Taiwan codes accept the
    /// `.TW`/`.TWO` suffixes.
    ///
    /// # Examples
    ///
    ///   quoteline quote AAPL
    ///   quoteline quote AAPL MSFT 2330 --pretty
    Quote(QuoteArgs),

    /// Fetch daily OHLCV bars, oldest first.
    ///
    /// # Examples
    ///
    ///   quoteline history AAPL
    ///   quoteline history 2330 --days 90
    History(HistoryArgs),

    /// Load popular US and Taiwan symbols into the cache and report how many loaded.
    Preload,

    /// Show cache and queue telemetry, optionally after quoting some symbols.
    Stats(StatsArgs),
}

#[derive(Debug, Args)]
pub struct QuoteArgs {
    /// One or more market symbols (e.g., AAPL, 2330, 6547.TWO).
    #[arg(required = true, num_args = 1..)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    pub symbol: String,

    /// Number of daily bars to return.
    #[arg(long, default_value_t = 30)]
    pub days: usize,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Symbols to quote before reading the statistics.
    #[arg(num_args = 0..)]
    pub symbols: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "quoteline",
            "quote",
            "AAPL",
            "2330",
            "--pretty",
            "--format",
            "table",
            "--batch-size",
            "5",
        ])
        .expect("valid args");

        assert!(cli.pretty);
        assert_eq!(cli.format, OutputFormat::Table);
        assert_eq!(cli.batch_size, Some(5));
        match cli.command {
            Command::Quote(args) => assert_eq!(args.symbols, vec!["AAPL", "2330"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn quote_requires_a_symbol() {
        assert!(Cli::try_parse_from(["quoteline", "quote"]).is_err());
    }

    #[test]
    fn history_defaults_to_thirty_days() {
        let cli = Cli::try_parse_from(["quoteline", "history", "MSFT"]).expect("valid args");
        match cli.command {
            Command::History(args) => {
                assert_eq!(args.symbol, "MSFT");
                assert_eq!(args.days, 30);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
