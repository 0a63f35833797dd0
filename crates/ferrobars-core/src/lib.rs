//! # Ferrobars Core
//!
//! Daily OHLCV ingestion with EMA indicators and windowed reads.
//!
//! ## Overview
//!
//! - **Normalizer** turns a loosely-shaped [`RawSeries`] into canonical bars
//! - **Indicator engine** adds `ema{w}` values per configured window
//! - **Orchestrator** drives fetch, normalize, indicators and upsert per symbol
//!   with per-symbol failure isolation
//! - **Window queries** read a bounded, data-anchored slice for quotes and charts
//!
//! The merge store itself lives in `ferrobars-warehouse` and is re-exported
//! here.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Price source adapters (Yahoo) |
//! | [`circuit_breaker`] | Circuit breaker for upstream calls |
//! | [`config`] | Process configuration |
//! | [`data_source`] | `PriceSource` trait and `FetchError` |
//! | [`domain`] | `Symbol` and `Period` |
//! | [`error`] | Validation, schema, config and ingest errors |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`indicators`] | EMA computation |
//! | [`ingest`] | Ingestion orchestrator and run report |
//! | [`normalize`] | Raw series to canonical bars |
//! | [`raw`] | Raw series model |
//! | [`retry`] | Retry and backoff policy |
//! | [`window`] | Windowed reads and quotes |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ferrobars_core::{AppConfig, IngestOptions, Orchestrator, Warehouse, YahooSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     let warehouse = Warehouse::open(config.warehouse_config())?;
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(YahooSource::default()),
//!         warehouse,
//!         IngestOptions::from(&config),
//!     );
//!
//!     let report = orchestrator.run(&config.tickers, config.start_date).await;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod circuit_breaker;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod indicators;
pub mod ingest;
pub mod normalize;
pub mod raw;
pub mod retry;
pub mod window;

pub use adapters::YahooSource;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

pub use config::AppConfig;

pub use data_source::{FetchError, FetchErrorKind, PriceSource};

pub use domain::{Period, Symbol};

pub use error::{ConfigError, IngestError, SchemaError, ValidationError};

pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

pub use indicators::{add_indicators, Ema, DEFAULT_EMA_WINDOWS};

pub use ingest::{
    IngestOptions, IngestReport, IngestStage, IngestSummary, Orchestrator, SymbolOutcome,
    SymbolReport,
};

pub use normalize::normalize;

pub use raw::{ColumnKey, RawColumn, RawSeries, RawTime, RawValues};

pub use retry::{Backoff, RetryConfig};

pub use window::{Quote, WindowQuery};

// Merge store (re-exported from ferrobars-warehouse)
pub use ferrobars_warehouse::{
    ema_field, format_timestamp, parse_timestamp, IngestLogEntry, IngestStatus, PriceBar,
    Warehouse, WarehouseConfig, WarehouseError, STORED_EMA_WINDOWS,
};
