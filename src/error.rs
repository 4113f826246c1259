//! Error taxonomy for the simulation core
//!
//! Library calls return [`BacktestError`]; the CLI wraps everything in
//! `anyhow` with context.

use thiserror::Error;

use crate::types::CandleValidationError;

/// Errors raised by the simulator, optimizer and candle generator
#[derive(Debug, Error, PartialEq)]
pub enum BacktestError {
    #[error("invalid config: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },

    #[error("invalid candle at index {index}: {source}")]
    InvalidCandle {
        index: usize,
        #[source]
        source: CandleValidationError,
    },

    #[error("candle timestamps must be strictly increasing (index {index})")]
    UnorderedCandles { index: usize },
}

impl BacktestError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        BacktestError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

/// Fail with `InvalidConfig` unless `value` is finite and strictly positive
pub(crate) fn require_positive(field: &'static str, value: f64) -> Result<(), BacktestError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(BacktestError::invalid(
            field,
            format!("must be a positive finite number, got {}", value),
        ));
    }
    Ok(())
}

/// Fail with `InvalidConfig` unless `value` is finite and >= 0
pub(crate) fn require_non_negative(field: &'static str, value: f64) -> Result<(), BacktestError> {
    if !value.is_finite() || value < 0.0 {
        return Err(BacktestError::invalid(
            field,
            format!("must be a non-negative finite number, got {}", value),
        ));
    }
    Ok(())
}
