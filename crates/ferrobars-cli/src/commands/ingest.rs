use std::sync::Arc;

use ferrobars_core::config::parse_date;
use ferrobars_core::{AppConfig, IngestOptions, Orchestrator, YahooSource};
use serde_json::Value;

use crate::cli::IngestArgs;
use crate::error::CliError;

use super::open_warehouse;

pub async fn run(args: &IngestArgs, config: AppConfig) -> Result<Value, CliError> {
    let start = match &args.start {
        Some(value) => parse_date(value)?,
        None => config.start_date,
    };

    let warehouse = open_warehouse(&config)?;
    // Each request gets a share of the per-symbol budget so retries can run.
    let source = YahooSource::default().with_fetch_budget(config.fetch_timeout);

    let orchestrator = Orchestrator::new(Arc::new(source), warehouse, IngestOptions::from(&config));
    let report = orchestrator.run(&config.tickers, start).await;

    Ok(serde_json::to_value(report)?)
}
