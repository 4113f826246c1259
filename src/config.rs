//! Configuration management
//!
//! Strategy parameters, engine policy and the JSON application config file.
//! Environment variables (optionally from a `.env` file) override capital and
//! leverage.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{require_non_negative, require_positive, BacktestError};
use crate::generator::GeneratorConfig;
use crate::grid::ParamGrid;
use crate::Bias;

/// Default number of candles scanned after entry before a position times out
pub const DEFAULT_LOOKAHEAD: usize = 60;

/// Parameters for one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    /// Fractional price move that closes a position in profit (0.001 = 0.1%)
    pub profit_target_pct: f64,
    /// Fractional adverse price move that closes a position at a loss
    pub stop_loss_pct: f64,
    pub leverage: f64,
    pub capital_usdc: f64,
    /// Adverse price impact applied on both entry and exit
    #[serde(default)]
    pub slippage_pct: f64,
    /// Fee per side, charged twice per round-trip
    #[serde(default)]
    pub fees_pct: f64,
    #[serde(default)]
    pub bias: Bias,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            profit_target_pct: 0.001,
            stop_loss_pct: 0.0005,
            leverage: 10.0,
            capital_usdc: 1_000.0,
            slippage_pct: 0.0001,
            fees_pct: 0.0002,
            bias: Bias::Long,
        }
    }
}

impl StrategyConfig {
    /// Check preconditions; nothing is simulated with an invalid config
    pub fn validate(&self) -> Result<(), BacktestError> {
        require_positive("profit_target_pct", self.profit_target_pct)?;
        require_positive("stop_loss_pct", self.stop_loss_pct)?;
        require_positive("leverage", self.leverage)?;
        require_positive("capital_usdc", self.capital_usdc)?;
        require_non_negative("slippage_pct", self.slippage_pct)?;
        require_non_negative("fees_pct", self.fees_pct)?;
        Ok(())
    }

    /// Everything except the TP/SL thresholds
    pub fn base(&self) -> BaseConfig {
        BaseConfig {
            leverage: self.leverage,
            capital_usdc: self.capital_usdc,
            slippage_pct: self.slippage_pct,
            fees_pct: self.fees_pct,
            bias: self.bias,
        }
    }
}

/// Strategy parameters shared by every optimizer grid cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseConfig {
    pub leverage: f64,
    pub capital_usdc: f64,
    pub slippage_pct: f64,
    pub fees_pct: f64,
    pub bias: Bias,
}

impl Default for BaseConfig {
    fn default() -> Self {
        StrategyConfig::default().base()
    }
}

impl BaseConfig {
    pub fn with_thresholds(&self, profit_target_pct: f64, stop_loss_pct: f64) -> StrategyConfig {
        StrategyConfig {
            profit_target_pct,
            stop_loss_pct,
            leverage: self.leverage,
            capital_usdc: self.capital_usdc,
            slippage_pct: self.slippage_pct,
            fees_pct: self.fees_pct,
            bias: self.bias,
        }
    }
}

/// Resolution for a candle whose range crosses both the target and the stop.
///
/// There is no intrabar ordering information, so this is a policy choice.
/// `TpFirst` matches historical results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    #[default]
    TpFirst,
    /// With a single target/stop pair the worst case is always the stop.
    #[serde(alias = "worst-case")]
    SlFirst,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tp-first" => Ok(TieBreak::TpFirst),
            "sl-first" | "worst-case" => Ok(TieBreak::SlFirst),
            other => Err(format!(
                "unknown tie-break '{}', expected one of: tp-first, sl-first, worst-case",
                other
            )),
        }
    }
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieBreak::TpFirst => write!(f, "tp-first"),
            TieBreak::SlFirst => write!(f, "sl-first"),
        }
    }
}

/// Engine settings that are not part of the strategy itself
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationPolicy {
    #[serde(default)]
    pub tie_break: TieBreak,
    /// Candles scanned after entry before a timeout exit
    #[serde(default = "default_lookahead")]
    pub lookahead: usize,
}

fn default_lookahead() -> usize {
    DEFAULT_LOOKAHEAD
}

impl Default for SimulationPolicy {
    fn default() -> Self {
        SimulationPolicy {
            tie_break: TieBreak::TpFirst,
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }
}

impl SimulationPolicy {
    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.lookahead == 0 {
            return Err(BacktestError::invalid("lookahead", "must be at least 1"));
        }
        Ok(())
    }
}

/// Main configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub simulation: SimulationPolicy,
    #[serde(default)]
    pub generator: GeneratorConfig,
    /// TP/SL values swept by the optimizer; defaults to the 42-cell grid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<ParamGrid>,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file {}", path.as_ref().display())
        })?;
        let mut config = Self::from_json(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(contents).context("Failed to parse config JSON")?;
        Ok(config)
    }

    /// Override capital and leverage from `BACKTEST_CAPITAL_USDC` / `BACKTEST_LEVERAGE`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(capital) = std::env::var("BACKTEST_CAPITAL_USDC") {
            self.strategy.capital_usdc = capital
                .trim()
                .parse()
                .with_context(|| format!("Invalid BACKTEST_CAPITAL_USDC: {}", capital))?;
        }
        if let Ok(leverage) = std::env::var("BACKTEST_LEVERAGE") {
            self.strategy.leverage = leverage
                .trim()
                .parse()
                .with_context(|| format!("Invalid BACKTEST_LEVERAGE: {}", leverage))?;
        }
        Ok(())
    }

    /// Grid from the config file, or the default 42-cell grid
    pub fn param_grid(&self) -> ParamGrid {
        self.grid.clone().unwrap_or_default()
    }
}

/// Backtest file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub data_dir: String,
    pub results_dir: String,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            data_dir: "data".to_string(),
            results_dir: "results".to_string(),
        }
    }
}
