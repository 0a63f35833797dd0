//! Loosely-shaped price tables as returned by a [`PriceSource`].
//!
//! A source reports whatever column naming and time representation it
//! happens to use. The [`normalize`](crate::normalize) step is the only
//! consumer that interprets these shapes.
//!
//! [`PriceSource`]: crate::PriceSource

use time::{Date, OffsetDateTime, PrimitiveDateTime};

/// Column identifier, either a single name or a hierarchical key such as
/// `("Close", "SPY")` from a multi-symbol download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKey {
    Flat(String),
    Multi(Vec<String>),
}

impl ColumnKey {
    pub fn flat(name: impl Into<String>) -> Self {
        Self::Flat(name.into())
    }

    pub fn multi<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Multi(levels.into_iter().map(Into::into).collect())
    }

    /// Single-level, lower-case field name. Hierarchical keys keep their
    /// outermost level; an unnamed column becomes `index`.
    pub fn field_name(&self) -> String {
        let name = match self {
            Self::Flat(name) => name.as_str(),
            Self::Multi(levels) => levels.first().map(String::as_str).unwrap_or_default(),
        };
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            String::from("index")
        } else {
            name
        }
    }
}

/// A time value in whichever representation the source produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTime {
    Naive(PrimitiveDateTime),
    Zoned(OffsetDateTime),
    Date(Date),
}

impl RawTime {
    /// Wall-clock time with any offset discarded.
    pub fn to_naive(self) -> PrimitiveDateTime {
        match self {
            Self::Naive(value) => value,
            Self::Zoned(value) => PrimitiveDateTime::new(value.date(), value.time()),
            Self::Date(value) => value.midnight(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawValues {
    Times(Vec<RawTime>),
    Numbers(Vec<Option<f64>>),
}

impl RawValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Times(values) => values.len(),
            Self::Numbers(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub key: ColumnKey,
    pub values: RawValues,
}

impl RawColumn {
    pub fn new(key: ColumnKey, values: RawValues) -> Self {
        Self { key, values }
    }

    pub fn times(key: ColumnKey, values: Vec<RawTime>) -> Self {
        Self::new(key, RawValues::Times(values))
    }

    pub fn numbers(key: ColumnKey, values: Vec<Option<f64>>) -> Self {
        Self::new(key, RawValues::Numbers(values))
    }
}

/// A fetched table: an optional labelled row index plus data columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSeries {
    pub index: Option<RawColumn>,
    pub columns: Vec<RawColumn>,
}

impl RawSeries {
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_index(mut self, column: RawColumn) -> Self {
        self.index = Some(column);
        self
    }

    #[must_use]
    pub fn with_column(mut self, column: RawColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Index first, then data columns, as a flat table would list them.
    pub fn all_columns(&self) -> impl Iterator<Item = &RawColumn> {
        self.index.iter().chain(self.columns.iter())
    }

    /// Row count, taken from the longest column.
    pub fn row_count(&self) -> usize {
        self.all_columns()
            .map(|column| column.values.len())
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }
}
