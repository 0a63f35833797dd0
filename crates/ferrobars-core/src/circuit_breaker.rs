//! Upstream health tracking shared by one source across an ingestion run.
//!
//! The breaker never skips a symbol. While open it only trims the retry
//! budget, so each symbol still gets one real request and a dead upstream
//! costs one attempt per symbol instead of a full backoff schedule.

use std::sync::atomic::{AtomicU32, Ordering};

/// Circuit state for upstream price requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Symbols get the configured retry budget.
    Closed,
    /// Symbols get a single attempt until one of them succeeds.
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed symbols before the circuit opens.
    pub failure_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
        }
    }
}

/// Counts symbols whose fetch failed back to back.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    failed_symbols: AtomicU32,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            failed_symbols: AtomicU32::new(0),
        }
    }

    /// Attempts the next symbol may spend out of `configured`. Never zero.
    pub fn attempt_budget(&self, configured: u32) -> u32 {
        match self.state() {
            CircuitState::Closed => configured.max(1),
            CircuitState::Open => 1,
        }
    }

    /// The upstream answered for a symbol (data or a definite "unknown").
    pub fn record_success(&self) {
        self.failed_symbols.store(0, Ordering::Relaxed);
    }

    /// A symbol's fetch failed after its attempt budget ran out.
    pub fn record_failure(&self) {
        // Saturate instead of wrapping back to a closed circuit.
        let _ = self
            .failed_symbols
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
                Some(count.saturating_add(1))
            });
    }

    pub fn state(&self) -> CircuitState {
        if self.consecutive_failures() >= self.config.failure_threshold.max(1) {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failed_symbols.load(Ordering::Relaxed)
    }
}
