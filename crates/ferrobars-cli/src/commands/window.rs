use ferrobars_core::{AppConfig, Period, PriceBar, Symbol, WindowQuery};
use serde::Serialize;
use serde_json::Value;

use crate::cli::WindowArgs;
use crate::error::CliError;

use super::open_warehouse;

#[derive(Debug, Serialize)]
struct WindowResponseData {
    symbol: String,
    period: String,
    bars: Vec<PriceBar>,
}

pub fn run(args: &WindowArgs, config: &AppConfig) -> Result<Value, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let period = Period::parse(&args.period)?;
    let query = WindowQuery::new(open_warehouse(config)?);

    let bars = query.windowed(symbol.as_str(), period)?;
    tracing::info!(symbol = %symbol, period = %period, bars = bars.len(), "window read");

    Ok(serde_json::to_value(WindowResponseData {
        symbol: symbol.to_string(),
        period: period.to_string(),
        bars,
    })?)
}
