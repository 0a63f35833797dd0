use ferrobars_core::{AppConfig, Symbol, WindowQuery};
use serde_json::Value;

use crate::cli::QuoteArgs;
use crate::error::CliError;

use super::open_warehouse;

/// Prints `null` when nothing is stored for the symbol.
pub fn run(args: &QuoteArgs, config: &AppConfig) -> Result<Value, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let query = WindowQuery::new(open_warehouse(config)?);

    let quote = query.quote(symbol.as_str())?;
    if quote.is_none() {
        tracing::warn!(symbol = %symbol, "no stored data; has ingestion run?");
    }
    Ok(serde_json::to_value(quote)?)
}
