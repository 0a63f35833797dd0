//! Raw series to canonical [`PriceBar`] rows.
//!
//! Each canonical field is located through an explicit list of recognized
//! source names. The first listed variant that is present wins.
//!
//! | Canonical | Recognized source names |
//! |-----------|-------------------------|
//! | `timestamp` | `date`, `datetime`, `timestamp` |
//! | `open` | `open` |
//! | `high` | `high` |
//! | `low` | `low` |
//! | `close` | `close`, `adj close`, `adj_close` |
//! | `volume` | `volume` |

use time::Date;
use tracing::debug;

use crate::raw::{RawSeries, RawTime, RawValues};
use crate::{PriceBar, SchemaError, Symbol};

const TIME_FIELDS: &[&str] = &["date", "datetime", "timestamp"];
const OPEN_FIELDS: &[&str] = &["open"];
const HIGH_FIELDS: &[&str] = &["high"];
const LOW_FIELDS: &[&str] = &["low"];
const CLOSE_FIELDS: &[&str] = &["close", "adj close", "adj_close"];
const VOLUME_FIELDS: &[&str] = &["volume"];

/// Canonical fields in output order, with their recognized variants.
const CANONICAL_FIELDS: [(&str, &[&str]); 6] = [
    ("timestamp", TIME_FIELDS),
    ("open", OPEN_FIELDS),
    ("high", HIGH_FIELDS),
    ("low", LOW_FIELDS),
    ("close", CLOSE_FIELDS),
    ("volume", VOLUME_FIELDS),
];

/// Convert a raw fetch result into ascending, de-duplicated bars for `symbol`.
///
/// An empty raw series yields an empty vector. Rows earlier than `start` are
/// dropped, as are rows with a missing or non-finite open/high/low/close. A
/// missing volume is stored as zero. When two rows share a timestamp the later
/// one is kept.
///
/// # Errors
///
/// [`SchemaError::MissingFields`] names every canonical field that no column
/// maps to, alongside the full list of columns that were present.
pub fn normalize(
    raw: &RawSeries,
    symbol: &Symbol,
    start: Date,
) -> Result<Vec<PriceBar>, SchemaError> {
    let expected = raw.row_count();
    if expected == 0 {
        return Ok(Vec::new());
    }

    let columns = raw
        .all_columns()
        .map(|column| (column.key.field_name(), &column.values))
        .collect::<Vec<_>>();

    for (name, values) in &columns {
        if values.len() != expected {
            return Err(SchemaError::RaggedColumn {
                column: name.clone(),
                len: values.len(),
                expected,
            });
        }
    }

    let lookup = |variants: &[&str]| {
        variants.iter().find_map(|variant| {
            columns
                .iter()
                .find(|(name, _)| name.as_str() == *variant)
                .map(|(name, values)| (name.as_str(), *values))
        })
    };

    let resolved = CANONICAL_FIELDS.map(|(_, variants)| lookup(variants));
    let missing = CANONICAL_FIELDS
        .iter()
        .zip(&resolved)
        .filter(|(_, found)| found.is_none())
        .map(|((canonical, _), _)| canonical.to_string())
        .collect::<Vec<_>>();
    let [Some(time), Some(open), Some(high), Some(low), Some(close), Some(volume)] = resolved
    else {
        return Err(SchemaError::MissingFields {
            missing,
            present: columns.iter().map(|(name, _)| name.clone()).collect(),
        });
    };

    let times = time_values(time)?;
    let open = number_values(open)?;
    let high = number_values(high)?;
    let low = number_values(low)?;
    let close = number_values(close)?;
    let volume = number_values(volume)?;

    let mut bars = Vec::with_capacity(expected);
    let mut incomplete = 0_usize;
    for row in 0..expected {
        let timestamp = times[row].to_naive();
        if timestamp.date() < start {
            continue;
        }

        let prices = [open[row], high[row], low[row], close[row]];
        let [Some(o), Some(h), Some(l), Some(c)] = prices.map(|v| v.filter(|p| p.is_finite()))
        else {
            incomplete += 1;
            continue;
        };

        bars.push(PriceBar::new(
            symbol.as_str(),
            timestamp,
            o,
            h,
            l,
            c,
            volume_units(volume[row]),
        ));
    }

    if incomplete > 0 {
        debug!(symbol = %symbol, incomplete, "dropped rows with missing prices");
    }

    Ok(sort_and_dedupe(bars))
}

fn time_values<'a>((name, values): (&str, &'a RawValues)) -> Result<&'a [RawTime], SchemaError> {
    match values {
        RawValues::Times(values) => Ok(values),
        RawValues::Numbers(_) => Err(SchemaError::WrongColumnType {
            column: name.to_string(),
            expected: "timestamps",
        }),
    }
}

fn number_values<'a>(
    (name, values): (&str, &'a RawValues),
) -> Result<&'a [Option<f64>], SchemaError> {
    match values {
        RawValues::Numbers(values) => Ok(values),
        RawValues::Times(_) => Err(SchemaError::WrongColumnType {
            column: name.to_string(),
            expected: "numbers",
        }),
    }
}

fn volume_units(value: Option<f64>) -> u64 {
    match value {
        Some(volume) if volume.is_finite() && volume > 0.0 => volume.round() as u64,
        _ => 0,
    }
}

fn sort_and_dedupe(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    // Stable sort keeps source order among equal timestamps.
    bars.sort_by_key(|bar| bar.timestamp);

    let mut unique: Vec<PriceBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match unique.last_mut() {
            Some(last) if last.timestamp == bar.timestamp => *last = bar,
            _ => unique.push(bar),
        }
    }
    unique
}
