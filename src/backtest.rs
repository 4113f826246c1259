//! Backtesting engine
//!
//! Replays a take-profit/stop-loss strategy candle by candle with a single
//! open position, compounding capital between trades. Slippage is applied
//! adversely on entry and exit and fees are charged on both sides.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{SimulationPolicy, StrategyConfig, TieBreak};
use crate::error::BacktestError;
use crate::{Bias, Direction, ExitReason, PriceCandle, Summary, Trade};

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Non-fatal conditions noticed during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Too few candles for a single trade attempt
    InsufficientData { available: usize, required: usize },
    /// Capital was exhausted and the run stopped early
    Bankrupt { after_trades: usize, capital: f64 },
}

/// Full output of one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub config: StrategyConfig,
    pub policy: SimulationPolicy,
    pub trades: Vec<Trade>,
    pub summary: Summary,
    pub final_capital_usd: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

/// Simulate `config` over `candles` with the default policy
pub fn simulate(
    candles: &[PriceCandle],
    config: &StrategyConfig,
) -> Result<BacktestResult, BacktestError> {
    simulate_with_policy(candles, config, &SimulationPolicy::default())
}

/// Simulate `config` over `candles` with an explicit tie-break and lookahead
pub fn simulate_with_policy(
    candles: &[PriceCandle],
    config: &StrategyConfig,
    policy: &SimulationPolicy,
) -> Result<BacktestResult, BacktestError> {
    config.validate()?;
    policy.validate()?;
    validate_candles(candles)?;
    Ok(Backtester::new(config.clone(), *policy).run(candles))
}

/// Check that the series is non-empty, every candle is well-formed and
/// timestamps strictly increase.
///
/// The whole series must also span at most `i64::MAX` milliseconds, which
/// bounds every trade duration and throughput window.
pub fn validate_candles(candles: &[PriceCandle]) -> Result<(), BacktestError> {
    let (first, last) = match (candles.first(), candles.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(BacktestError::invalid("candles", "must not be empty")),
    };
    for (index, candle) in candles.iter().enumerate() {
        candle
            .validate()
            .map_err(|source| BacktestError::InvalidCandle { index, source })?;
        if index > 0 && candle.timestamp <= candles[index - 1].timestamp {
            return Err(BacktestError::UnorderedCandles { index });
        }
    }
    if last.timestamp.checked_sub(first.timestamp).is_none() {
        return Err(BacktestError::invalid(
            "candles",
            format!(
                "timestamp span {}..{} overflows a millisecond duration",
                first.timestamp, last.timestamp
            ),
        ));
    }
    Ok(())
}

/// Exit located by the forward scan
struct Exit {
    index: usize,
    price: f64,
    reason: ExitReason,
}

/// Backtest engine for already-validated inputs
pub(crate) struct Backtester {
    config: StrategyConfig,
    policy: SimulationPolicy,
}

impl Backtester {
    pub(crate) fn new(config: StrategyConfig, policy: SimulationPolicy) -> Self {
        Backtester { config, policy }
    }

    pub(crate) fn run(&self, candles: &[PriceCandle]) -> BacktestResult {
        let initial_capital = self.config.capital_usdc;
        let mut capital = initial_capital;
        let mut direction = self.config.bias.initial_direction();
        let mut trades = Vec::new();
        let mut diagnostics = Vec::new();

        let mut drawdown = DrawdownTracker::new(initial_capital);

        if candles.len() < 2 {
            warn!(
                candles = candles.len(),
                "Not enough candles for a single trade attempt"
            );
            diagnostics.push(Diagnostic::InsufficientData {
                available: candles.len(),
                required: 2,
            });
        }

        let mut i = 0;
        while i + 1 < candles.len() {
            let entry_candle = &candles[i];
            let exit = self.scan_for_exit(candles, i, direction);
            let exit_candle = &candles[exit.index];

            let entry_price = self.slipped_entry(entry_candle.close, direction);
            let exit_price = self.slipped_exit(exit.price, direction);

            let price_return = match direction {
                Direction::Long => (exit_price - entry_price) / entry_price,
                Direction::Short => (entry_price - exit_price) / entry_price,
            };
            let pnl_pct = price_return - 2.0 * self.config.fees_pct;
            let pnl_usd = capital * self.config.leverage * pnl_pct;
            capital += pnl_usd;
            drawdown.update(capital);

            let trade = Trade {
                entry_time: entry_candle.timestamp,
                entry_price,
                exit_time: exit_candle.timestamp,
                exit_price,
                direction,
                pnl_pct,
                pnl_leveraged: pnl_pct * self.config.leverage,
                pnl_usd,
                exit_reason: exit.reason,
                duration_ms: exit_candle.timestamp - entry_candle.timestamp,
                capital_after: capital,
            };
            debug!(
                direction = %trade.direction,
                reason = %trade.exit_reason,
                entry = trade.entry_price,
                exit = trade.exit_price,
                pnl_usd = trade.pnl_usd,
                capital,
                "Trade closed"
            );
            trades.push(trade);

            i = exit.index + 1;
            if self.config.bias == Bias::Alternate {
                direction = direction.opposite();
            }

            if capital <= 0.0 {
                warn!(trades = trades.len(), capital, "Capital exhausted, halting run");
                diagnostics.push(Diagnostic::Bankrupt {
                    after_trades: trades.len(),
                    capital,
                });
                break;
            }
        }

        let summary = summarize(&trades, initial_capital, &drawdown);
        debug!(
            trades = summary.total_trades,
            win_rate = summary.win_rate,
            profit_factor = summary.profit_factor,
            final_capital = capital,
            "Backtest finished"
        );

        BacktestResult {
            config: self.config.clone(),
            policy: self.policy,
            trades,
            summary,
            final_capital_usd: capital,
            diagnostics,
        }
    }

    /// Scan forward from `entry` for the first candle that hits the target or
    /// the stop, falling back to a timeout at the last scanned close
    fn scan_for_exit(&self, candles: &[PriceCandle], entry: usize, direction: Direction) -> Exit {
        let reference = candles[entry].close;
        let tp_pct = self.config.profit_target_pct;
        let sl_pct = self.config.stop_loss_pct;

        let (tp, sl) = match direction {
            Direction::Long => (reference * (1.0 + tp_pct), reference * (1.0 - sl_pct)),
            Direction::Short => (reference * (1.0 - tp_pct), reference * (1.0 + sl_pct)),
        };

        let remaining = candles.len() - entry - 1;
        let last = entry + self.policy.lookahead.min(remaining);

        for (index, candle) in candles.iter().enumerate().take(last + 1).skip(entry + 1) {
            let (hit_tp, hit_sl) = match direction {
                Direction::Long => (candle.high >= tp, candle.low <= sl),
                Direction::Short => (candle.low <= tp, candle.high >= sl),
            };

            let reason = match (self.policy.tie_break, hit_tp, hit_sl) {
                (TieBreak::TpFirst, true, _) => Some(ExitReason::Tp),
                (TieBreak::TpFirst, false, true) => Some(ExitReason::Sl),
                (TieBreak::SlFirst, _, true) => Some(ExitReason::Sl),
                (TieBreak::SlFirst, true, false) => Some(ExitReason::Tp),
                _ => None,
            };

            if let Some(reason) = reason {
                let price = if reason == ExitReason::Tp { tp } else { sl };
                return Exit { index, price, reason };
            }
        }

        Exit {
            index: last,
            price: candles[last].close,
            reason: ExitReason::Timeout,
        }
    }

    fn slipped_entry(&self, price: f64, direction: Direction) -> f64 {
        match direction {
            Direction::Long => price * (1.0 + self.config.slippage_pct),
            Direction::Short => price * (1.0 - self.config.slippage_pct),
        }
    }

    fn slipped_exit(&self, price: f64, direction: Direction) -> f64 {
        match direction {
            Direction::Long => price * (1.0 - self.config.slippage_pct),
            Direction::Short => price * (1.0 + self.config.slippage_pct),
        }
    }
}

/// Running capital extremes for both drawdown metrics
#[derive(Debug, Clone)]
pub(crate) struct DrawdownTracker {
    max_capital: f64,
    min_capital: f64,
    peak: f64,
    max_sequential: f64,
}

impl DrawdownTracker {
    pub(crate) fn new(initial_capital: f64) -> Self {
        DrawdownTracker {
            max_capital: initial_capital,
            min_capital: initial_capital,
            peak: initial_capital,
            max_sequential: 0.0,
        }
    }

    pub(crate) fn update(&mut self, capital: f64) {
        self.max_capital = self.max_capital.max(capital);
        self.min_capital = self.min_capital.min(capital);

        if capital > self.peak {
            self.peak = capital;
        }
        if self.peak > 0.0 {
            let dd = (self.peak - capital) / self.peak;
            if dd > self.max_sequential {
                self.max_sequential = dd;
            }
        }
    }

    /// (max - min) / max over the whole run, ignoring ordering
    pub(crate) fn range_drawdown(&self) -> f64 {
        if self.max_capital <= 0.0 {
            return 0.0;
        }
        (self.max_capital - self.min_capital) / self.max_capital
    }

    pub(crate) fn sequential_drawdown(&self) -> f64 {
        self.max_sequential
    }
}

/// Derive summary statistics from the trade sequence
pub(crate) fn summarize(
    trades: &[Trade],
    initial_capital: f64,
    drawdown: &DrawdownTracker,
) -> Summary {
    if trades.is_empty() {
        return Summary::default();
    }

    let total = trades.len();
    let (wins, losses): (Vec<&Trade>, Vec<&Trade>) = trades.iter().partition(|t| t.is_win());

    let gross_profit: f64 = wins.iter().map(|t| t.pnl_usd).sum();
    let gross_loss: f64 = losses.iter().map(|t| t.pnl_usd).sum::<f64>().abs();

    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let avg_win_usd = if wins.is_empty() {
        0.0
    } else {
        gross_profit / wins.len() as f64
    };
    let avg_loss_usd = if losses.is_empty() {
        0.0
    } else {
        gross_loss / losses.len() as f64
    };

    let total_pnl_usd: f64 = trades.iter().map(|t| t.pnl_usd).sum();
    let total_pnl_pct = if initial_capital > 0.0 {
        total_pnl_usd / initial_capital * 100.0
    } else {
        0.0
    };

    let avg_trade_duration_ms =
        trades.iter().map(|t| t.duration_ms as f64).sum::<f64>() / total as f64;

    // Non-empty, checked above
    let span_ms = trades[total - 1].exit_time - trades[0].entry_time;
    let trades_per_hour = if span_ms > 0 {
        total as f64 / (span_ms as f64 / MS_PER_HOUR)
    } else {
        0.0
    };

    let count_reason = |reason: ExitReason| trades.iter().filter(|t| t.exit_reason == reason).count();

    Summary {
        total_trades: total,
        winning_trades: wins.len(),
        losing_trades: losses.len(),
        win_rate: wins.len() as f64 / total as f64 * 100.0,
        total_pnl_usd,
        total_pnl_pct,
        avg_win_usd,
        avg_loss_usd,
        profit_factor,
        max_drawdown_pct: drawdown.range_drawdown(),
        sequential_drawdown_pct: drawdown.sequential_drawdown(),
        avg_trade_duration_ms,
        trades_per_hour,
        tp_exits: count_reason(ExitReason::Tp),
        sl_exits: count_reason(ExitReason::Sl),
        timeout_exits: count_reason(ExitReason::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const MINUTE: i64 = 60_000;

    fn candle(i: i64, open: f64, high: f64, low: f64, close: f64) -> PriceCandle {
        PriceCandle::new_unchecked(i * MINUTE, open, high, low, close)
    }

    fn frictionless(tp: f64, sl: f64) -> StrategyConfig {
        StrategyConfig {
            profit_target_pct: tp,
            stop_loss_pct: sl,
            leverage: 1.0,
            capital_usdc: 1_000.0,
            slippage_pct: 0.0,
            fees_pct: 0.0,
            bias: Bias::Long,
        }
    }

    #[test]
    fn test_long_take_profit_at_target_price() {
        let candles = vec![
            candle(0, 100.0, 100.0, 100.0, 100.0),
            candle(1, 100.0, 101.5, 99.9, 101.0),
        ];
        let result = simulate(&candles, &frictionless(0.01, 0.01)).unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::Tp);
        assert_relative_eq!(trade.exit_price, 101.0, epsilon = 1e-9);
        assert_relative_eq!(trade.pnl_pct, 0.01, epsilon = 1e-9);
        assert_relative_eq!(trade.pnl_usd, 10.0, epsilon = 1e-9);
        assert_eq!(trade.duration_ms, MINUTE);
    }

    #[test]
    fn test_short_stop_loss() {
        let candles = vec![
            candle(0, 100.0, 100.0, 100.0, 100.0),
            candle(1, 100.0, 100.6, 99.8, 100.4),
        ];
        let config = StrategyConfig {
            bias: Bias::Short,
            ..frictionless(0.01, 0.005)
        };
        let result = simulate(&candles, &config).unwrap();
        let trade = &result.trades[0];
        assert_eq!(trade.direction, Direction::Short);
        assert_eq!(trade.exit_reason, ExitReason::Sl);
        assert_relative_eq!(trade.exit_price, 100.5, epsilon = 1e-9);
        assert_relative_eq!(trade.pnl_pct, -0.005, epsilon = 1e-9);
    }

    #[test]
    fn test_tie_break_policies() {
        // Second candle spans both target and stop
        let candles = vec![
            candle(0, 100.0, 100.0, 100.0, 100.0),
            candle(1, 100.0, 102.0, 98.0, 100.0),
        ];
        let config = frictionless(0.01, 0.01);

        let tp_first = simulate(&candles, &config).unwrap();
        assert_eq!(tp_first.trades[0].exit_reason, ExitReason::Tp);

        let policy = SimulationPolicy {
            tie_break: TieBreak::SlFirst,
            ..Default::default()
        };
        let sl_first = simulate_with_policy(&candles, &config, &policy).unwrap();
        assert_eq!(sl_first.trades[0].exit_reason, ExitReason::Sl);
        assert!(sl_first.trades[0].pnl_usd < 0.0);
    }

    #[test]
    fn test_timeout_respects_lookahead() {
        let candles: Vec<PriceCandle> = (0..10).map(|i| PriceCandle::flat(i * MINUTE, 100.0)).collect();
        let policy = SimulationPolicy {
            lookahead: 3,
            ..Default::default()
        };
        let result = simulate_with_policy(&candles, &frictionless(0.01, 0.01), &policy).unwrap();

        // Entries at 0, 4, 8; the last trade is cut short by the end of data
        assert_eq!(result.trades.len(), 3);
        assert_eq!(result.trades[0].exit_time, 3 * MINUTE);
        assert_eq!(result.trades[1].entry_time, 4 * MINUTE);
        assert_eq!(result.trades[2].exit_time, 9 * MINUTE);
        assert!(result.trades.iter().all(|t| t.exit_reason == ExitReason::Timeout));

        // Three trades over nine minutes
        let s = &result.summary;
        assert_relative_eq!(s.trades_per_hour, 20.0, epsilon = 1e-9);
        assert_relative_eq!(s.avg_trade_duration_ms, (3 + 3 + 1) as f64 * MINUTE as f64 / 3.0, epsilon = 1e-9);
        assert_eq!(s.total_pnl_usd, 0.0);
        assert_eq!(s.total_pnl_pct, 0.0);
    }

    #[test]
    fn test_mixed_run_summary_values() {
        let candles = vec![
            PriceCandle::flat(0, 100.0),
            candle(1, 100.0, 101.5, 100.0, 101.0),
            PriceCandle::flat(2 * MINUTE, 101.0),
            candle(3, 101.0, 101.0, 99.9, 100.0),
            PriceCandle::flat(4 * MINUTE, 100.0),
            candle(5, 100.0, 101.5, 100.0, 101.0),
        ];
        let result = simulate(&candles, &frictionless(0.01, 0.01)).unwrap();
        let reasons: Vec<ExitReason> = result.trades.iter().map(|t| t.exit_reason).collect();
        assert_eq!(reasons, vec![ExitReason::Tp, ExitReason::Sl, ExitReason::Tp]);

        // +10 on 1000, -10.1 on 1010, +9.999 on 999.9
        let s = &result.summary;
        assert_eq!((s.winning_trades, s.losing_trades), (2, 1));
        assert_relative_eq!(s.avg_win_usd, (10.0 + 9.999) / 2.0, epsilon = 1e-9);
        assert_relative_eq!(s.avg_loss_usd, 10.1, epsilon = 1e-9);
        assert_relative_eq!(s.total_pnl_usd, 9.899, epsilon = 1e-9);
        assert_relative_eq!(s.total_pnl_pct, 0.9899, epsilon = 1e-9);
        assert_relative_eq!(s.profit_factor, 19.999 / 10.1, epsilon = 1e-9);
        assert_relative_eq!(s.avg_trade_duration_ms, MINUTE as f64, epsilon = 1e-9);
        // Three trades over five minutes
        assert_relative_eq!(s.trades_per_hour, 36.0, epsilon = 1e-9);
        assert_relative_eq!(result.final_capital_usd, 1_009.899, epsilon = 1e-9);
    }

    #[test]
    fn test_extreme_timestamps() {
        let overflowing = vec![PriceCandle::flat(i64::MIN + 1, 100.0), PriceCandle::flat(i64::MAX, 100.0)];
        assert!(matches!(
            simulate(&overflowing, &frictionless(0.01, 0.01)),
            Err(BacktestError::InvalidConfig { field: "candles", .. })
        ));

        // Widest span that still fits a duration
        let widest = vec![PriceCandle::flat(i64::MIN, 100.0), PriceCandle::flat(-1, 100.0)];
        let result = simulate(&widest, &frictionless(0.01, 0.01)).unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].duration_ms, i64::MAX);
        assert!(result.summary.trades_per_hour > 0.0);
    }

    #[test]
    fn test_slippage_and_fees() {
        let candles = vec![
            candle(0, 100.0, 100.0, 100.0, 100.0),
            candle(1, 100.0, 100.0, 100.0, 100.0),
        ];
        let config = StrategyConfig {
            slippage_pct: 0.001,
            fees_pct: 0.0005,
            leverage: 10.0,
            ..frictionless(0.01, 0.01)
        };
        let trade = simulate(&candles, &config).unwrap().trades.remove(0);

        assert_relative_eq!(trade.entry_price, 100.1, epsilon = 1e-9);
        assert_relative_eq!(trade.exit_price, 99.9, epsilon = 1e-9);
        let expected = (99.9 - 100.1) / 100.1 - 0.001;
        assert_relative_eq!(trade.pnl_pct, expected, epsilon = 1e-12);
        assert_relative_eq!(trade.pnl_leveraged, expected * 10.0, epsilon = 1e-12);
        assert_relative_eq!(trade.pnl_usd, 1_000.0 * 10.0 * expected, epsilon = 1e-9);
    }

    #[test]
    fn test_capital_compounds() {
        let candles = vec![
            candle(0, 100.0, 100.0, 100.0, 100.0),
            candle(1, 100.0, 111.0, 100.0, 110.0),
            candle(2, 110.0, 110.0, 110.0, 110.0),
            candle(3, 110.0, 122.0, 110.0, 121.0),
        ];
        let result = simulate(&candles, &frictionless(0.1, 0.1)).unwrap();
        assert_eq!(result.trades.len(), 2);
        assert_relative_eq!(result.trades[0].pnl_usd, 100.0, epsilon = 1e-9);
        // Second trade sized from 1,100 of capital
        assert_relative_eq!(result.trades[1].pnl_usd, 110.0, epsilon = 1e-9);
        assert_relative_eq!(result.final_capital_usd, 1_210.0, epsilon = 1e-9);
    }

    #[test]
    fn test_single_candle_reports_insufficient_data() {
        let candles = vec![PriceCandle::flat(0, 100.0)];
        let result = simulate(&candles, &frictionless(0.01, 0.01)).unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.summary, Summary::default());
        assert_eq!(
            result.diagnostics,
            vec![Diagnostic::InsufficientData { available: 1, required: 2 }]
        );
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        let candles = vec![PriceCandle::flat(0, 100.0), PriceCandle::flat(MINUTE, 100.0)];

        assert!(matches!(
            simulate(&[], &frictionless(0.01, 0.01)),
            Err(BacktestError::InvalidConfig { field: "candles", .. })
        ));
        let broke = StrategyConfig { capital_usdc: 0.0, ..frictionless(0.01, 0.01) };
        assert!(matches!(
            simulate(&candles, &broke),
            Err(BacktestError::InvalidConfig { field: "capital_usdc", .. })
        ));

        let unordered = vec![PriceCandle::flat(MINUTE, 100.0), PriceCandle::flat(0, 100.0)];
        assert_eq!(
            simulate(&unordered, &frictionless(0.01, 0.01)),
            Err(BacktestError::UnorderedCandles { index: 1 })
        );

        let malformed = vec![PriceCandle::flat(0, 100.0), candle(1, 100.0, 99.0, 101.0, 100.0)];
        assert!(matches!(
            simulate(&malformed, &frictionless(0.01, 0.01)),
            Err(BacktestError::InvalidCandle { index: 1, .. })
        ));
    }

    #[test]
    fn test_drawdown_metrics_differ() {
        // Capital rises then falls: 1000 -> 900 -> 1200 -> 1080
        let mut tracker = DrawdownTracker::new(1_000.0);
        for capital in [900.0, 1_200.0, 1_080.0] {
            tracker.update(capital);
        }
        assert_relative_eq!(tracker.range_drawdown(), 0.25, epsilon = 1e-12);
        assert_relative_eq!(tracker.sequential_drawdown(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_drawdown_with_wiped_out_capital() {
        let mut tracker = DrawdownTracker::new(100.0);
        tracker.update(-50.0);
        assert_relative_eq!(tracker.range_drawdown(), 1.5, epsilon = 1e-12);
        assert_relative_eq!(tracker.sequential_drawdown(), 1.5, epsilon = 1e-12);
        assert!(tracker.range_drawdown().is_finite());
    }

    #[test]
    fn test_summary_profit_factor_cases() {
        let tracker = DrawdownTracker::new(1_000.0);
        let make = |pnl: f64| Trade {
            entry_time: 0,
            entry_price: 1.0,
            exit_time: MINUTE,
            exit_price: 1.0,
            direction: Direction::Long,
            pnl_pct: 0.0,
            pnl_leveraged: 0.0,
            pnl_usd: pnl,
            exit_reason: ExitReason::Timeout,
            duration_ms: MINUTE,
            capital_after: 1_000.0 + pnl,
        };

        let mixed = summarize(&[make(30.0), make(-10.0), make(-5.0)], 1_000.0, &tracker);
        assert_relative_eq!(mixed.profit_factor, 2.0, epsilon = 1e-12);
        assert_relative_eq!(mixed.avg_loss_usd, 7.5, epsilon = 1e-12);
        assert_relative_eq!(mixed.total_pnl_pct, 1.5, epsilon = 1e-12);

        let all_wins = summarize(&[make(5.0)], 1_000.0, &tracker);
        assert!(all_wins.profit_factor.is_infinite());

        let break_even = summarize(&[make(0.0)], 1_000.0, &tracker);
        assert_eq!(break_even.profit_factor, 0.0);
        assert_eq!(break_even.losing_trades, 1);
        assert_eq!(break_even.win_rate, 0.0);
    }
}
