//! Price source trait and fetch error taxonomy.
//!
//! A [`PriceSource`] returns a daily [`RawSeries`] for one symbol. The
//! orchestrator never inspects upstream shapes itself; it hands the raw
//! series to the Normalizer.
//!
//! # Example
//!
//! ```rust,ignore
//! use ferrobars_core::{PriceSource, Symbol, YahooSource};
//! use time::macros::date;
//!
//! async fn fetch(source: &YahooSource) -> Result<(), ferrobars_core::FetchError> {
//!     let symbol = Symbol::parse("SPY").expect("valid ticker");
//!     let raw = source.fetch_daily(&symbol, date!(2022-01-01)).await?;
//!     println!("{} rows", raw.row_count());
//!     Ok(())
//! }
//! ```

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use time::Date;

use crate::raw::RawSeries;
use crate::Symbol;

/// Fetch failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// Network failure or upstream 5xx.
    Unreachable,
    /// The source does not know the symbol.
    SymbolNotFound,
    /// The response could not be decoded.
    MalformedResponse,
    /// The per-symbol fetch budget elapsed.
    Timeout,
    /// The source asked us to slow down.
    RateLimited,
}

/// Structured fetch error recorded as a per-symbol failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    retryable: bool,
}

impl FetchError {
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Unreachable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn symbol_not_found(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::SymbolNotFound,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::MalformedResponse,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Timeout,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Unreachable => "fetch.unreachable",
            FetchErrorKind::SymbolNotFound => "fetch.symbol_not_found",
            FetchErrorKind::MalformedResponse => "fetch.malformed_response",
            FetchErrorKind::Timeout => "fetch.timeout",
            FetchErrorKind::RateLimited => "fetch.rate_limited",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

/// Source of daily price history.
///
/// Implementations must be `Send + Sync`; the orchestrator holds them behind
/// an `Arc` and may be driven from any runtime worker.
pub trait PriceSource: Send + Sync {
    /// Short identifier used in logs.
    fn id(&self) -> &'static str;

    /// Fetch daily bars for `symbol` from `start` up to the latest available.
    ///
    /// An unknown-but-valid empty history (delisted, not yet listed) should be
    /// an empty [`RawSeries`] rather than an error where the source allows the
    /// distinction.
    fn fetch_daily<'a>(
        &'a self,
        symbol: &'a Symbol,
        start: Date,
    ) -> Pin<Box<dyn Future<Output = Result<RawSeries, FetchError>> + Send + 'a>>;
}
