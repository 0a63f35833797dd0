//! # Ingestion Orchestrator
//!
//! Drives each symbol of the universe through
//! `Fetching -> Normalizing -> ComputingIndicators -> Persisting -> Done`.
//! A failure at any step ends that symbol in `Failed` and the run moves on;
//! one bad symbol never aborts the run. Every [`SymbolReport`] carries the
//! stage the symbol stopped in.
//!
//! Symbols are processed one at a time. Each symbol's rows are written in a
//! single merge-store transaction, so a concurrent reader sees either the
//! previous rows or the new ones.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::{Date, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::data_source::{FetchError, PriceSource};
use crate::indicators::add_indicators;
use crate::normalize::normalize;
use crate::{IngestError, IngestLogEntry, IngestStatus, Symbol, Warehouse};

/// Pipeline state of one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Fetching,
    Normalizing,
    ComputingIndicators,
    Persisting,
    Done,
}

impl IngestStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Normalizing => "normalizing",
            Self::ComputingIndicators => "computing_indicators",
            Self::Persisting => "persisting",
            Self::Done => "done",
        }
    }
}

/// Terminal outcome of one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SymbolOutcome {
    Ok {
        rows: usize,
    },
    SkippedEmpty,
    Failed {
        kind: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolReport {
    pub symbol: String,
    /// `Done` unless the symbol failed, then the stage that failed.
    pub stage: IngestStage,
    #[serde(flatten)]
    pub outcome: SymbolOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub ok: usize,
    pub skipped_empty: usize,
    pub failed: usize,
    pub rows_upserted: usize,
}

/// Result of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    /// First calendar date requested, `YYYY-MM-DD`.
    pub start_date: String,
    pub symbols: Vec<SymbolReport>,
    pub summary: IngestSummary,
}

impl IngestReport {
    pub fn outcome(&self, symbol: &str) -> Option<&SymbolOutcome> {
        self.report(symbol).map(|report| &report.outcome)
    }

    pub fn stage(&self, symbol: &str) -> Option<IngestStage> {
        self.report(symbol).map(|report| report.stage)
    }

    fn report(&self, symbol: &str) -> Option<&SymbolReport> {
        self.symbols.iter().find(|report| report.symbol == symbol)
    }
}

/// Knobs that apply to every symbol of a run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub ema_windows: Vec<u32>,
    pub fetch_timeout: Duration,
}

impl From<&AppConfig> for IngestOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            ema_windows: config.ema_windows.clone(),
            fetch_timeout: config.fetch_timeout,
        }
    }
}

pub struct Orchestrator {
    source: Arc<dyn PriceSource>,
    warehouse: Warehouse,
    options: IngestOptions,
}

impl Orchestrator {
    pub fn new(source: Arc<dyn PriceSource>, warehouse: Warehouse, options: IngestOptions) -> Self {
        Self {
            source,
            warehouse,
            options,
        }
    }

    /// Ingest every symbol of `universe` from `start` onwards.
    ///
    /// Always completes; per-symbol failures are reported, logged and
    /// recorded in the ingest log.
    pub async fn run(&self, universe: &[Symbol], start: Date) -> IngestReport {
        let run_id = Uuid::new_v4().to_string();
        let started_at = OffsetDateTime::now_utc();
        info!(
            run_id = %run_id,
            source = self.source.id(),
            db_path = %self.warehouse.db_path().display(),
            symbols = universe.len(),
            start = %start,
            "ingestion run started"
        );

        let mut symbols = Vec::with_capacity(universe.len());
        let mut summary = IngestSummary::default();
        for symbol in universe {
            let mut stage = IngestStage::Fetching;
            let result = self.ingest_symbol(symbol, start, &mut stage).await;
            let outcome = match result {
                Ok(0) => {
                    warn!(symbol = %symbol, "no rows returned; skipping");
                    summary.skipped_empty += 1;
                    SymbolOutcome::SkippedEmpty
                }
                Ok(rows) => {
                    info!(symbol = %symbol, rows, "upserted");
                    summary.ok += 1;
                    summary.rows_upserted += rows;
                    SymbolOutcome::Ok { rows }
                }
                Err(failure) => {
                    log_failure(symbol, stage, &failure);
                    summary.failed += 1;
                    SymbolOutcome::Failed {
                        kind: failure.kind().to_string(),
                        reason: failure.to_string(),
                    }
                }
            };
            symbols.push(SymbolReport {
                symbol: symbol.to_string(),
                stage,
                outcome,
            });
        }

        let report = IngestReport {
            run_id,
            started_at,
            finished_at: OffsetDateTime::now_utc(),
            start_date: start.to_string(),
            symbols,
            summary,
        };

        if let Err(failure) = self.warehouse.record_ingest(&log_entries(&report)) {
            warn!(run_id = %report.run_id, error = %failure, "could not record ingest log");
        }

        info!(
            run_id = %report.run_id,
            ok = summary.ok,
            skipped_empty = summary.skipped_empty,
            failed = summary.failed,
            rows = summary.rows_upserted,
            "ingestion run finished"
        );
        report
    }

    /// Run one symbol through the pipeline. Returns the rows upserted; zero
    /// means the source had nothing for the symbol.
    ///
    /// `stage` is advanced as the symbol moves on, so on error it names the
    /// stage that failed. It ends at `Done` on success.
    pub async fn ingest_symbol(
        &self,
        symbol: &Symbol,
        start: Date,
        stage: &mut IngestStage,
    ) -> Result<usize, IngestError> {
        enter(symbol, stage, IngestStage::Fetching);
        let fetch = self.source.fetch_daily(symbol, start);
        let raw = tokio::time::timeout(self.options.fetch_timeout, fetch)
            .await
            .map_err(|_| {
                FetchError::timeout(format!(
                    "no response within {} ms",
                    self.options.fetch_timeout.as_millis()
                ))
            })??;

        enter(symbol, stage, IngestStage::Normalizing);
        let mut bars = normalize(&raw, symbol, start)?;
        if bars.is_empty() {
            enter(symbol, stage, IngestStage::Done);
            return Ok(0);
        }

        enter(symbol, stage, IngestStage::ComputingIndicators);
        add_indicators(&mut bars, &self.options.ema_windows);

        enter(symbol, stage, IngestStage::Persisting);
        // DuckDB writes are short and the run is sequential.
        let rows = self.warehouse.upsert(&bars)?;

        enter(symbol, stage, IngestStage::Done);
        Ok(rows)
    }
}

fn enter(symbol: &Symbol, stage: &mut IngestStage, next: IngestStage) {
    *stage = next;
    debug!(symbol = %symbol, stage = next.as_str(), "stage");
}

fn log_failure(symbol: &Symbol, stage: IngestStage, failure: &IngestError) {
    let stage = stage.as_str();
    match failure {
        IngestError::Fetch(cause) => {
            warn!(symbol = %symbol, stage, code = cause.code(), error = %cause, "fetch failed");
        }
        IngestError::Schema(cause) => {
            error!(symbol = %symbol, stage, error = %cause, "upstream schema drift");
        }
        IngestError::Storage(cause) => {
            error!(symbol = %symbol, stage, error = %cause, "storage write failed");
        }
    }
}

fn log_entries(report: &IngestReport) -> Vec<IngestLogEntry> {
    report
        .symbols
        .iter()
        .map(|entry| {
            let (status, rows, detail) = match &entry.outcome {
                SymbolOutcome::Ok { rows } => (IngestStatus::Ok, *rows as u64, None),
                SymbolOutcome::SkippedEmpty => (IngestStatus::SkippedEmpty, 0, None),
                SymbolOutcome::Failed { reason, .. } => {
                    (IngestStatus::Failed, 0, Some(reason.clone()))
                }
            };
            IngestLogEntry {
                run_id: report.run_id.clone(),
                symbol: entry.symbol.clone(),
                status,
                rows,
                detail,
            }
        })
        .collect()
}
