use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Duration, PrimitiveDateTime};

use crate::WarehouseError;

/// EMA windows that have a column in the `ohlcv` table.
pub const STORED_EMA_WINDOWS: [u32; 3] = [8, 21, 50];

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Column/field name for the EMA of a window (8 -> "ema8").
pub fn ema_field(window: u32) -> String {
    format!("ema{window}")
}

/// Render a naive timestamp as `YYYY-MM-DD HH:MM:SS`.
///
/// Sub-second digits are not part of the stored key; see [`truncate_to_second`].
pub fn format_timestamp(ts: PrimitiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| truncate_to_second(ts).to_string())
}

/// Drop everything below whole seconds, the precision of the `ohlcv` key.
pub fn truncate_to_second(ts: PrimitiveDateTime) -> PrimitiveDateTime {
    ts - Duration::nanoseconds(i64::from(ts.nanosecond()))
}

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp as written by [`format_timestamp`].
pub fn parse_timestamp(value: &str) -> Result<PrimitiveDateTime, WarehouseError> {
    PrimitiveDateTime::parse(value.trim(), TIMESTAMP_FORMAT)
        .map_err(|error| WarehouseError::InvalidData(format!("timestamp '{value}': {error}")))
}

/// One row of the canonical daily time series.
///
/// `emas` maps an indicator window to its value; it is empty until the
/// indicator engine has run over the bar's series.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    /// Uppercase ticker.
    pub symbol: String,
    /// Naive calendar timestamp.
    pub timestamp: PrimitiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub emas: BTreeMap<u32, f64>,
}

impl PriceBar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        timestamp: PrimitiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp: truncate_to_second(timestamp),
            open,
            high,
            low,
            close,
            volume,
            emas: BTreeMap::new(),
        }
    }

    pub fn ema(&self, window: u32) -> Option<f64> {
        self.emas.get(&window).copied()
    }

    pub fn set_ema(&mut self, window: u32, value: f64) {
        self.emas.insert(window, value);
    }

    #[must_use]
    pub fn with_ema(mut self, window: u32, value: f64) -> Self {
        self.set_ema(window, value);
        self
    }
}

impl Serialize for PriceBar {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(7 + self.emas.len()))?;
        map.serialize_entry("timestamp", &format_timestamp(self.timestamp))?;
        map.serialize_entry("open", &self.open)?;
        map.serialize_entry("high", &self.high)?;
        map.serialize_entry("low", &self.low)?;
        map.serialize_entry("close", &self.close)?;
        map.serialize_entry("volume", &self.volume)?;
        map.serialize_entry("symbol", &self.symbol)?;
        for (window, value) in &self.emas {
            map.serialize_entry(&ema_field(*window), value)?;
        }
        map.end()
    }
}

/// Per-symbol outcome recorded in the ingest audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Ok,
    SkippedEmpty,
    Failed,
}

impl IngestStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::SkippedEmpty => "skipped_empty",
            Self::Failed => "failed",
        }
    }
}

impl Display for IngestStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IngestStatus {
    type Err = WarehouseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ok" => Ok(Self::Ok),
            "skipped_empty" => Ok(Self::SkippedEmpty),
            "failed" => Ok(Self::Failed),
            other => Err(WarehouseError::InvalidData(format!(
                "unknown ingest status '{other}'"
            ))),
        }
    }
}

/// One audit-log entry written by an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestLogEntry {
    pub run_id: String,
    pub symbol: String,
    pub status: IngestStatus,
    pub rows: u64,
    pub detail: Option<String>,
}
