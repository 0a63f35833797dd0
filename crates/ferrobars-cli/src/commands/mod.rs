mod ingest;
mod quote;
mod serve;
mod window;

use ferrobars_core::config::parse_tickers;
use ferrobars_core::{AppConfig, Warehouse};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Run the selected command. `None` means nothing to print.
pub async fn run(cli: &Cli) -> Result<Option<Value>, CliError> {
    let config = load_config(cli)?;
    tracing::debug!(?config, "configuration loaded");

    match &cli.command {
        Command::Ingest(args) => ingest::run(args, config).await.map(Some),
        Command::Serve(args) => serve::run(args, config).await.map(|()| None),
        Command::Quote(args) => quote::run(args, &config).map(Some),
        Command::Window(args) => window::run(args, &config).map(Some),
    }
}

/// Environment first, then command-line overrides.
fn load_config(cli: &Cli) -> Result<AppConfig, CliError> {
    let mut config = AppConfig::from_env()?;
    if let Some(db_path) = &cli.db_path {
        config.db_path = db_path.clone();
    }
    if let Some(tickers) = &cli.tickers {
        config.tickers = parse_tickers("--tickers", tickers)?;
    }
    Ok(config)
}

fn open_warehouse(config: &AppConfig) -> Result<Warehouse, CliError> {
    Ok(Warehouse::open(config.warehouse_config())?)
}
