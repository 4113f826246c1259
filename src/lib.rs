//! TP/SL Backtester
//!
//! Deterministic backtesting and grid optimization for a leveraged
//! take-profit/stop-loss strategy, with a seedable synthetic candle
//! generator for reproducible runs.

pub mod backtest;
pub mod config;
pub mod data;
pub mod error;
pub mod generator;
pub mod grid;
pub mod optimizer;
pub mod types;

pub use backtest::{simulate, simulate_with_policy, BacktestResult, Diagnostic};
pub use config::{BaseConfig, Config, SimulationPolicy, StrategyConfig, TieBreak};
pub use error::BacktestError;
pub use generator::{generate, generate_seeded, GeneratorConfig};
pub use grid::ParamGrid;
pub use optimizer::{optimize, OptimizationOutcome, Optimizer};
pub use types::*;
