//! Core data types used across the backtesting engine

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Validation errors for candle data
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive and finite: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// One OHLC bar. `timestamp` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceCandle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PriceCandle {
    /// Create a new candle with validation
    pub fn new(
        timestamp: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self::new_unchecked(timestamp, open, high, low, close);
        candle.validate()?;
        Ok(candle)
    }

    /// Create a candle without validation (for trusted sources or when validation is done separately)
    pub fn new_unchecked(timestamp: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    /// Flat candle where every price equals `price`
    pub fn flat(timestamp: i64, price: f64) -> Self {
        Self::new_unchecked(timestamp, price, price, price, price)
    }

    /// Validate the candle data
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    /// Check if the candle is valid without returning detailed error
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Timestamp as a UTC datetime, if representable
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Directional policy for successive trades
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    #[default]
    Long,
    Short,
    Alternate,
}

impl Bias {
    /// Direction of the first trade in a run
    pub fn initial_direction(self) -> Direction {
        match self {
            Bias::Long | Bias::Alternate => Direction::Long,
            Bias::Short => Direction::Short,
        }
    }
}

impl FromStr for Bias {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long" => Ok(Bias::Long),
            "short" => Ok(Bias::Short),
            "alternate" => Ok(Bias::Alternate),
            other => Err(format!(
                "unknown bias '{}', expected one of: long, short, alternate",
                other
            )),
        }
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bias::Long => write!(f, "long"),
            Bias::Short => write!(f, "short"),
            Bias::Alternate => write!(f, "alternate"),
        }
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitReason {
    Tp,
    Sl,
    Timeout,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Tp => write!(f, "tp"),
            ExitReason::Sl => write!(f, "sl"),
            ExitReason::Timeout => write!(f, "timeout"),
        }
    }
}

/// Completed round-trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: i64,
    /// Entry price after slippage
    pub entry_price: f64,
    pub exit_time: i64,
    /// Exit price after slippage
    pub exit_price: f64,
    pub direction: Direction,
    /// Fee-adjusted, unleveraged return (fraction)
    pub pnl_pct: f64,
    pub pnl_leveraged: f64,
    pub pnl_usd: f64,
    pub exit_reason: ExitReason,
    pub duration_ms: i64,
    /// Capital once this trade has settled
    pub capital_after: f64,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl_usd > 0.0
    }
}

/// Aggregate statistics for one simulation run
///
/// Every field is a finite number except `profit_factor`, which is `+inf`
/// when there are winning trades and no losing ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percentage in [0, 100]
    pub win_rate: f64,
    pub total_pnl_usd: f64,
    /// Total PnL as a percentage of starting capital
    pub total_pnl_pct: f64,
    pub avg_win_usd: f64,
    /// Average loss as a positive magnitude
    pub avg_loss_usd: f64,
    pub profit_factor: f64,
    /// Legacy range drawdown: (max capital - min capital) / max capital over
    /// the whole run, as a fraction. The minimum may precede the maximum.
    pub max_drawdown_pct: f64,
    /// Peak-to-trough drawdown where the trough follows the peak, as a fraction
    pub sequential_drawdown_pct: f64,
    pub avg_trade_duration_ms: f64,
    pub trades_per_hour: f64,
    pub tp_exits: usize,
    pub sl_exits: usize,
    pub timeout_exits: usize,
}
