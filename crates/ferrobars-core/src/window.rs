//! Date-windowed reads over the merge store.
//!
//! Windows are anchored to the newest stored bar of the symbol, not to the
//! wall clock, so stale data still yields a full window relative to its own
//! freshness.

use serde::Serialize;

use crate::domain::Period;
use crate::{format_timestamp, PriceBar, Warehouse, WarehouseError};

/// Look-back used for quotes.
pub const QUOTE_PERIOD: Period = Period::Months(1);

/// Latest bar plus its change against the bar before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub symbol: String,
    /// `YYYY-MM-DD HH:MM:SS`
    pub dt: String,
    pub close: f64,
    pub volume: u64,
    /// Percent change vs. the prior bar, rounded to 3 decimals.
    pub pct_change: f64,
}

/// Read-side access to stored bars.
#[derive(Clone)]
pub struct WindowQuery {
    warehouse: Warehouse,
}

impl WindowQuery {
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    /// Bars of `symbol` within `[latest - period, latest]`, ascending.
    ///
    /// Unknown symbols yield an empty vector.
    pub fn windowed(&self, symbol: &str, period: Period) -> Result<Vec<PriceBar>, WarehouseError> {
        let bars = self
            .warehouse
            .query_by_symbol(&symbol.trim().to_ascii_uppercase())?;
        Ok(slice_window(bars, period))
    }

    /// [`windowed`](Self::windowed) with a textual period; unrecognized or
    /// absent periods mean six months.
    pub fn windowed_spec(
        &self,
        symbol: &str,
        period: Option<&str>,
    ) -> Result<Vec<PriceBar>, WarehouseError> {
        self.windowed(symbol, Period::parse_or_default(period))
    }

    /// Latest bar of the trailing one-month window, or `None` without data.
    pub fn quote(&self, symbol: &str) -> Result<Option<Quote>, WarehouseError> {
        let bars = self.windowed(symbol, QUOTE_PERIOD)?;
        Ok(quote_from(&bars))
    }
}

/// Keep the bars no older than `period` before the newest one.
pub fn slice_window(bars: Vec<PriceBar>, period: Period) -> Vec<PriceBar> {
    let Some(latest) = bars.iter().map(|bar| bar.timestamp).max() else {
        return bars;
    };
    match period.start_before(latest) {
        Some(start) => bars
            .into_iter()
            .filter(|bar| bar.timestamp >= start && bar.timestamp <= latest)
            .collect(),
        None => bars,
    }
}

/// Build a quote from an ascending window.
pub fn quote_from(bars: &[PriceBar]) -> Option<Quote> {
    let last = bars.last()?;
    let prev = bars.len().checked_sub(2).map_or(last, |index| &bars[index]);

    let pct = if prev.close == 0.0 {
        0.0
    } else {
        (last.close - prev.close) / prev.close * 100.0
    };

    Some(Quote {
        symbol: last.symbol.clone(),
        dt: format_timestamp(last.timestamp),
        close: last.close,
        volume: last.volume,
        pct_change: (pct * 1000.0).round() / 1000.0,
    })
}
