//! Grid search optimizer
//!
//! Runs the backtester once per TP/SL grid cell in parallel with Rayon and
//! ranks the results best-first by profit factor.

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::backtest::{validate_candles, BacktestResult, Backtester};
use crate::config::{BaseConfig, SimulationPolicy, StrategyConfig};
use crate::error::BacktestError;
use crate::grid::ParamGrid;
use crate::PriceCandle;

/// Output of a grid sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub best_config: StrategyConfig,
    /// Every cell's result, best first
    pub all_results: Vec<BacktestResult>,
}

impl OptimizationOutcome {
    pub fn best(&self) -> Option<&BacktestResult> {
        self.all_results.first()
    }

    /// The first `n` results
    pub fn top(&self, n: usize) -> &[BacktestResult] {
        &self.all_results[..n.min(self.all_results.len())]
    }
}

/// Sweep `grid` with the default policy, in parallel
pub fn optimize(
    candles: &[PriceCandle],
    base: &BaseConfig,
    grid: &ParamGrid,
) -> Result<OptimizationOutcome, BacktestError> {
    Optimizer::default().optimize(candles, base, grid)
}

/// Grid optimizer
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    policy: SimulationPolicy,
    sequential: bool,
}

impl Optimizer {
    pub fn new(policy: SimulationPolicy) -> Self {
        Optimizer {
            policy,
            sequential: false,
        }
    }

    /// Evaluate cells one at a time (for debugging)
    pub fn sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn optimize(
        &self,
        candles: &[PriceCandle],
        base: &BaseConfig,
        grid: &ParamGrid,
    ) -> Result<OptimizationOutcome, BacktestError> {
        self.run(candles, base, grid, None)
    }

    /// Run optimization with progress tracking
    pub fn optimize_with_progress(
        &self,
        candles: &[PriceCandle],
        base: &BaseConfig,
        grid: &ParamGrid,
        progress_bar: &ProgressBar,
    ) -> Result<OptimizationOutcome, BacktestError> {
        self.run(candles, base, grid, Some(progress_bar))
    }

    fn run(
        &self,
        candles: &[PriceCandle],
        base: &BaseConfig,
        grid: &ParamGrid,
        progress_bar: Option<&ProgressBar>,
    ) -> Result<OptimizationOutcome, BacktestError> {
        grid.validate()?;
        self.policy.validate()?;
        validate_candles(candles)?;

        let configs: Vec<StrategyConfig> = grid
            .cells()
            .into_iter()
            .map(|(tp, sl)| base.with_thresholds(tp, sl))
            .collect();
        for config in &configs {
            config.validate()?;
        }

        tracing::info!(
            "Testing {} parameter combinations ({})",
            configs.len(),
            if self.sequential { "sequential" } else { "parallel" }
        );

        let evaluate = |config: &StrategyConfig| {
            let result = Backtester::new(config.clone(), self.policy).run(candles);
            if let Some(pb) = progress_bar {
                pb.inc(1);
            }
            result
        };

        let mut all_results: Vec<BacktestResult> = if self.sequential {
            configs.iter().map(evaluate).collect()
        } else {
            configs.par_iter().map(evaluate).collect()
        };

        sort_results(&mut all_results);

        // Grid validated non-empty above
        let best_config = all_results[0].config.clone();
        tracing::info!(
            tp = best_config.profit_target_pct,
            sl = best_config.stop_loss_pct,
            profit_factor = all_results[0].summary.profit_factor,
            total_pnl_usd = all_results[0].summary.total_pnl_usd,
            "Best configuration selected"
        );

        Ok(OptimizationOutcome {
            best_config,
            all_results,
        })
    }
}

/// Best-first ordering: profit factor descending, then total PnL descending
/// among results whose profit factor is infinite. The sort is stable, so
/// equal results keep grid order.
pub fn compare_results(a: &BacktestResult, b: &BacktestResult) -> Ordering {
    let (pa, pb) = (a.summary.profit_factor, b.summary.profit_factor);
    match pb.partial_cmp(&pa).unwrap_or(Ordering::Equal) {
        Ordering::Equal if pa.is_infinite() && pb.is_infinite() => b
            .summary
            .total_pnl_usd
            .partial_cmp(&a.summary.total_pnl_usd)
            .unwrap_or(Ordering::Equal),
        ordering => ordering,
    }
}

/// Sort optimization results best-first
pub fn sort_results(results: &mut [BacktestResult]) {
    results.sort_by(compare_results);
}
