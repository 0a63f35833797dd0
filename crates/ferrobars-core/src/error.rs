use thiserror::Error;

use crate::data_source::FetchError;
use crate::WarehouseError;

/// Validation errors for user- and config-supplied values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("date must be YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },

    #[error("indicator window must be a positive integer: '{value}'")]
    InvalidWindow { value: String },

    #[error("period must be <n>mo, <n>y or <n>yr with n > 0: '{value}'")]
    InvalidPeriod { value: String },
}

/// The Normalizer could not map a raw series onto the canonical fields.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Missing expected columns: {missing:?}. Got columns: {present:?}")]
    MissingFields {
        missing: Vec<String>,
        present: Vec<String>,
    },

    #[error("column '{column}' has {len} values, expected {expected}")]
    RaggedColumn {
        column: String,
        len: usize,
        expected: usize,
    },

    #[error("column '{column}' must hold {expected}")]
    WrongColumnType {
        column: String,
        expected: &'static str,
    },
}

impl SchemaError {
    /// Canonical fields that could not be located, if that is the failure.
    pub fn missing(&self) -> &[String] {
        match self {
            Self::MissingFields { missing, .. } => missing,
            _ => &[],
        }
    }
}

/// Unusable process configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: invalid ticker '{value}': {source}")]
    InvalidTicker {
        var: &'static str,
        value: String,
        source: ValidationError,
    },

    #[error("{var}: {source}")]
    InvalidValue {
        var: &'static str,
        source: ValidationError,
    },

    #[error("{var}: expected an unsigned integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var}: expected host:port, got '{value}'")]
    InvalidAddress { var: &'static str, value: String },

    #[error("{var} names no symbols")]
    EmptyUniverse { var: &'static str },

    #[error("{var} names no indicator windows")]
    EmptyWindows { var: &'static str },

    #[error("{var} must include every stored indicator window; missing {missing:?}")]
    MissingStoredWindows { var: &'static str, missing: Vec<u32> },
}

/// Per-symbol failure cause recorded by the ingestion orchestrator.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("schema drift: {0}")]
    Schema(#[from] SchemaError),

    #[error("storage failed: {0}")]
    Storage(#[from] WarehouseError),
}

impl IngestError {
    /// Stable machine-readable cause.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(error) => error.code(),
            Self::Schema(_) => "schema.drift",
            Self::Storage(_) => "storage.write",
        }
    }
}
