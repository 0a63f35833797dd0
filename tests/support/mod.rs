//! Shared fixtures for the behavior suites.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use ferrobars_core::{
    ColumnKey, FetchError, PriceBar, PriceSource, RawColumn, RawSeries, RawTime, Symbol,
    Warehouse, WarehouseConfig,
};
use tempfile::TempDir;
use time::{Date, PrimitiveDateTime, Time};

/// What a scripted source hands back for one symbol.
#[derive(Clone)]
pub enum Scripted {
    Series(RawSeries),
    Error(FetchError),
}

/// In-memory price source keyed by symbol. Unscripted symbols are not found.
#[derive(Default)]
pub struct ScriptedSource {
    responses: HashMap<String, Scripted>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: &str, series: RawSeries) -> Self {
        self.responses
            .insert(symbol.to_string(), Scripted::Series(series));
        self
    }

    pub fn with_error(mut self, symbol: &str, error: FetchError) -> Self {
        self.responses
            .insert(symbol.to_string(), Scripted::Error(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PriceSource for ScriptedSource {
    fn id(&self) -> &'static str {
        "scripted"
    }

    fn fetch_daily<'a>(
        &'a self,
        symbol: &'a Symbol,
        _start: Date,
    ) -> Pin<Box<dyn Future<Output = Result<RawSeries, FetchError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = match self.responses.get(symbol.as_str()) {
            Some(Scripted::Series(series)) => Ok(series.clone()),
            Some(Scripted::Error(error)) => Err(error.clone()),
            None => Err(FetchError::symbol_not_found(format!(
                "no data for '{symbol}'"
            ))),
        };
        Box::pin(async move { response })
    }
}

/// A flat `Date/Open/High/Low/Close/Volume` table with one row per
/// `(date, close)` pair. Open, high and low track the close.
pub fn daily_series(rows: &[(Date, f64)]) -> RawSeries {
    let dates = rows.iter().map(|(date, _)| RawTime::Date(*date)).collect();
    let closes = rows.iter().map(|(_, close)| Some(*close)).collect::<Vec<_>>();
    let volumes = rows.iter().map(|_| Some(1_000.0)).collect();

    RawSeries::empty()
        .with_index(RawColumn::times(ColumnKey::flat("Date"), dates))
        .with_column(RawColumn::numbers(ColumnKey::flat("Open"), closes.clone()))
        .with_column(RawColumn::numbers(ColumnKey::flat("High"), closes.clone()))
        .with_column(RawColumn::numbers(ColumnKey::flat("Low"), closes.clone()))
        .with_column(RawColumn::numbers(ColumnKey::flat("Close"), closes))
        .with_column(RawColumn::numbers(ColumnKey::flat("Volume"), volumes))
}

/// Midnight of `date`.
pub fn at_midnight(date: Date) -> PrimitiveDateTime {
    PrimitiveDateTime::new(date, Time::MIDNIGHT)
}

/// A bar ready for the merge store: flat prices and every stored EMA set.
pub fn stored_bar(symbol: &str, date: Date, close: f64) -> PriceBar {
    PriceBar::new(symbol, at_midnight(date), close, close, close, close, 100)
        .with_ema(8, close)
        .with_ema(21, close)
        .with_ema(50, close)
}

pub fn temp_warehouse() -> (TempDir, Warehouse) {
    let temp = tempfile::tempdir().expect("tempdir");
    let warehouse =
        Warehouse::open(WarehouseConfig::at(temp.path().join("market.duckdb"))).expect("open");
    (temp, warehouse)
}

pub fn symbols(tickers: &[&str]) -> Vec<Symbol> {
    tickers
        .iter()
        .map(|ticker| Symbol::parse(ticker).expect("symbol"))
        .collect()
}
