//! CLI argument definitions for ferrobars.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ingest` | Fetch, normalize, add EMAs and upsert the symbol universe |
//! | `serve` | Run the HTTP read API |
//! | `quote` | Print the latest stored quote for a symbol |
//! | `window` | Print the stored bars of a symbol within a period |
//!
//! Global flags override the matching environment variables.
//!
//! ```bash
//! ferrobars ingest
//! ferrobars --tickers SPY,QQQ ingest --start 2024-01-01
//! ferrobars --db-path /tmp/market.duckdb serve --bind 127.0.0.1:8000
//! ferrobars quote SPY --pretty
//! ferrobars window XBI --period 1y
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "ferrobars",
    author,
    version,
    about = "Daily OHLCV ingestion with EMA indicators and a small read API"
)]
pub struct Cli {
    /// DuckDB file to use (overrides DB_PATH).
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Comma-separated symbol universe (overrides TICKERS).
    #[arg(long, global = true, value_name = "LIST")]
    pub tickers: Option<String>,

    /// Pretty-print JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one ingestion pass over the symbol universe.
    ///
    /// Per-symbol failures are reported in the run summary and never make
    /// the process exit non-zero.
    Ingest(IngestArgs),

    /// Serve GET /, /health, /quote and /chart.
    Serve(ServeArgs),

    /// Latest stored bar and its change against the prior bar.
    Quote(QuoteArgs),

    /// Stored bars within a period anchored at the newest bar.
    Window(WindowArgs),
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// First calendar date to request, YYYY-MM-DD (overrides ETL_START_DATE).
    #[arg(long, value_name = "DATE")]
    pub start: Option<String>,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Listen address (overrides BIND_ADDR).
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

#[derive(Debug, Args)]
pub struct QuoteArgs {
    pub symbol: String,
}

#[derive(Debug, Args)]
pub struct WindowArgs {
    pub symbol: String,

    /// Look-back such as 3mo, 1y or 2yr.
    #[arg(long, default_value = "6mo")]
    pub period: String,
}
