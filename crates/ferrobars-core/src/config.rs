//! Process configuration, read once at startup.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DB_PATH` | `data/market.duckdb` |
//! | `TICKERS` | `ARKK,SPY,STRL,WAY,XBI` |
//! | `API_KEY` | unset (auth disabled) |
//! | `EMA_WINDOWS` | `8,21,50` |
//! | `ETL_START_DATE` | `2022-01-01` |
//! | `FETCH_TIMEOUT_MS` | `15000` |
//! | `BIND_ADDR` | `0.0.0.0:8000` |

use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use time::format_description::BorrowedFormatItem;
use time::macros::{date, format_description};
use time::Date;

use crate::indicators::DEFAULT_EMA_WINDOWS;
use crate::{ConfigError, Symbol, ValidationError, WarehouseConfig, STORED_EMA_WINDOWS};

pub const DEFAULT_TICKERS: &str = "ARKK,SPY,STRL,WAY,XBI";
pub const DEFAULT_DB_PATH: &str = "data/market.duckdb";

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Explicit configuration passed into each component.
#[derive(Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// Symbol universe, de-duplicated, in configured order.
    pub tickers: Vec<Symbol>,
    /// Shared secret for the read API. `None` disables auth.
    pub api_key: Option<String>,
    pub ema_windows: Vec<u32>,
    pub start_date: Date,
    pub fetch_timeout: Duration,
    pub bind_addr: SocketAddr,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            tickers: DEFAULT_TICKERS
                .split(',')
                .filter_map(|ticker| Symbol::parse(ticker).ok())
                .collect(),
            api_key: None,
            ema_windows: DEFAULT_EMA_WINDOWS.to_vec(),
            start_date: date!(2022-01-01),
            fetch_timeout: Duration::from_millis(15_000),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
        }
    }
}

// The shared secret stays out of logs and panics.
impl Debug for AppConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("db_path", &self.db_path)
            .field("tickers", &self.tickers)
            .field("auth_enabled", &self.auth_enabled())
            .field("ema_windows", &self.ema_windows)
            .field("start_date", &self.start_date)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let defaults = Self::default();

        let db_path = var("DB_PATH").map_or(defaults.db_path, PathBuf::from);

        let tickers = match var("TICKERS") {
            Some(value) => parse_tickers("TICKERS", &value)?,
            None => defaults.tickers,
        };

        let ema_windows = match var("EMA_WINDOWS") {
            Some(value) => parse_windows("EMA_WINDOWS", &value)?,
            None => defaults.ema_windows,
        };

        let start_date = match var("ETL_START_DATE") {
            Some(value) => parse_date(&value).map_err(|source| ConfigError::InvalidValue {
                var: "ETL_START_DATE",
                source,
            })?,
            None => defaults.start_date,
        };

        let fetch_timeout = match var("FETCH_TIMEOUT_MS") {
            Some(value) => Duration::from_millis(value.parse::<u64>().map_err(|_| {
                ConfigError::InvalidNumber {
                    var: "FETCH_TIMEOUT_MS",
                    value: value.clone(),
                }
            })?),
            None => defaults.fetch_timeout,
        };

        let bind_addr = match var("BIND_ADDR") {
            Some(value) => parse_bind_addr("BIND_ADDR", &value)?,
            None => defaults.bind_addr,
        };

        Ok(Self {
            db_path,
            tickers,
            api_key: var("API_KEY"),
            ema_windows,
            start_date,
            fetch_timeout,
            bind_addr,
        })
    }

    pub fn auth_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn warehouse_config(&self) -> WarehouseConfig {
        WarehouseConfig::at(&self.db_path)
    }
}

/// Parse a comma-separated ticker list: trimmed, blanks dropped, uppercased,
/// validated and de-duplicated in first-seen order.
pub fn parse_tickers(var: &'static str, value: &str) -> Result<Vec<Symbol>, ConfigError> {
    let mut tickers: Vec<Symbol> = Vec::new();
    for raw in value.split(',').map(str::trim).filter(|raw| !raw.is_empty()) {
        let symbol = Symbol::parse(raw).map_err(|source| ConfigError::InvalidTicker {
            var,
            value: raw.to_string(),
            source,
        })?;
        if !tickers.contains(&symbol) {
            tickers.push(symbol);
        }
    }

    if tickers.is_empty() {
        return Err(ConfigError::EmptyUniverse { var });
    }
    Ok(tickers)
}

/// Parse a comma-separated list of positive EMA windows, de-duplicated.
///
/// The list must cover [`STORED_EMA_WINDOWS`]; extra windows are allowed and
/// only show up in computed series, never in the `ohlcv` table.
pub fn parse_windows(var: &'static str, value: &str) -> Result<Vec<u32>, ConfigError> {
    let mut windows: Vec<u32> = Vec::new();
    for raw in value.split(',').map(str::trim).filter(|raw| !raw.is_empty()) {
        let window = raw
            .parse::<u32>()
            .ok()
            .filter(|window| *window > 0)
            .ok_or_else(|| ConfigError::InvalidValue {
                var,
                source: ValidationError::InvalidWindow {
                    value: raw.to_string(),
                },
            })?;
        if !windows.contains(&window) {
            windows.push(window);
        }
    }

    if windows.is_empty() {
        return Err(ConfigError::EmptyWindows { var });
    }

    let missing = STORED_EMA_WINDOWS
        .into_iter()
        .filter(|window| !windows.contains(window))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(ConfigError::MissingStoredWindows { var, missing });
    }
    Ok(windows)
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<Date, ValidationError> {
    Date::parse(value.trim(), DATE_FORMAT).map_err(|_| ValidationError::InvalidDate {
        value: value.to_string(),
    })
}

pub fn parse_bind_addr(var: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .trim()
        .parse::<SocketAddr>()
        .map_err(|_| ConfigError::InvalidAddress {
            var,
            value: value.to_string(),
        })
}
