use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Json;
use ferrobars_core::Quote;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::chart::render_close_with_emas;
use crate::error::ApiError;
use crate::AppState;

const QUOTE_NOT_FOUND: &str = "No data — ETL may not have run yet or bad symbol";
const CHART_NOT_FOUND: &str = "No data — ETL may not have run yet or bad symbol/period";

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChartParams {
    pub symbol: Option<String>,
    pub period: Option<String>,
}

/// GET / - capability listing
pub async fn root() -> Json<Value> {
    Json(json!({ "ok": true, "paths": ["/health", "/quote", "/chart"] }))
}

/// GET /health - liveness and the configured storage path
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "ok": true, "db_path": state.db_path }))
}

/// GET /quote?symbol=SPY
#[instrument(skip(state))]
pub async fn quote(
    State(state): State<AppState>,
    Query(params): Query<QuoteParams>,
) -> Result<Json<Quote>, ApiError> {
    let symbol = required_symbol(params.symbol)?;

    let query = state.query.clone();
    let quote = tokio::task::spawn_blocking(move || query.quote(&symbol)).await??;

    quote.map(Json).ok_or(ApiError::NotFound(QUOTE_NOT_FOUND))
}

/// GET /chart?symbol=SPY&period=6mo
#[instrument(skip(state))]
pub async fn chart(
    State(state): State<AppState>,
    Query(params): Query<ChartParams>,
) -> Result<impl IntoResponse, ApiError> {
    let symbol = required_symbol(params.symbol)?;

    let query = state.query.clone();
    let lookup = symbol.clone();
    let bars = tokio::task::spawn_blocking(move || {
        query.windowed_spec(&lookup, params.period.as_deref())
    })
    .await??;

    if bars.is_empty() {
        return Err(ApiError::NotFound(CHART_NOT_FOUND));
    }
    debug!(symbol = %symbol, bars = bars.len(), "rendering chart");

    let svg = render_close_with_emas(&symbol, &bars);
    Ok(([(CONTENT_TYPE, "image/svg+xml")], svg))
}

fn required_symbol(symbol: Option<String>) -> Result<String, ApiError> {
    symbol
        .map(|symbol| symbol.trim().to_ascii_uppercase())
        .filter(|symbol| !symbol.is_empty())
        .ok_or_else(|| ApiError::BadRequest(String::from("query parameter 'symbol' is required")))
}
