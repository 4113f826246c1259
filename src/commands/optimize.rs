//! Optimize command implementation with progress tracking and custom grid support

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tpsl_backtester::grid::{format_pct, parse_value_list};
use tpsl_backtester::{Config, Optimizer, ParamGrid};
use tracing::info;

use super::{format_profit_factor, load_candles, write_results};

pub struct OptimizeArgs {
    pub config_path: String,
    pub data: Option<String>,
    pub seed: u64,
    pub tp_grid: Option<String>,
    pub sl_grid: Option<String>,
    pub quick: bool,
    pub top: usize,
    pub sequential: bool,
}

pub fn run(args: OptimizeArgs) -> Result<()> {
    info!("Starting optimization");

    let config = Config::from_file(&args.config_path)?;
    info!("Loaded configuration from: {}", args.config_path);

    let mut grid = if args.quick {
        ParamGrid::quick()
    } else {
        config.param_grid()
    };
    if let Some(ref s) = args.tp_grid {
        match parse_value_list(s) {
            Some(values) => grid.tp = values,
            None => bail!("Invalid --tp-grid: {}", s),
        }
    }
    if let Some(ref s) = args.sl_grid {
        match parse_value_list(s) {
            Some(values) => grid.sl = values,
            None => bail!("Invalid --sl-grid: {}", s),
        }
    }

    let candles = load_candles(&config, args.data.as_deref(), args.seed)?;
    let base = config.strategy.base();
    let total = grid.total_combinations();

    println!("\n{}", "=".repeat(70));
    println!("OPTIMIZATION SUMMARY");
    println!("{}", "=".repeat(70));
    println!("  Candles:       {}", candles.len());
    println!("  TP values:     {:?}", grid.tp);
    println!("  SL values:     {:?}", grid.sl);
    println!("  Total tests:   {}", total);
    println!("  Mode:          {}", if args.sequential { "sequential" } else { "parallel" });
    println!("{}\n", "=".repeat(70));

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}]")?
            .progress_chars("█░ "),
    );

    let optimizer = Optimizer::new(config.simulation).sequential(args.sequential);
    let outcome = optimizer.optimize_with_progress(&candles, &base, &grid, &pb)?;
    pb.finish();
    println!();

    let display_count = args.top.min(outcome.all_results.len());
    println!("\n{}", "=".repeat(100));
    println!("TOP {} OPTIMIZATION RESULTS (sorted by profit factor)", display_count);
    println!("{}", "=".repeat(100));
    println!(
        "{:<4} {:>9} {:>9} {:>8} {:>12} {:>9} {:>8} {:>7} {:>8}",
        "Rank", "TP", "SL", "PF", "PnL$", "PnL%", "WinR%", "Trades", "MaxDD%"
    );
    println!("{}", "-".repeat(100));

    for (i, result) in outcome.top(args.top).iter().enumerate() {
        let s = &result.summary;
        println!(
            "{:<4} {:>9} {:>9} {:>8} {:>12.2} {:>9.2} {:>8.2} {:>7} {:>8.2}",
            i + 1,
            format_pct(result.config.profit_target_pct),
            format_pct(result.config.stop_loss_pct),
            format_profit_factor(s.profit_factor),
            s.total_pnl_usd,
            s.total_pnl_pct,
            s.win_rate,
            s.total_trades,
            s.max_drawdown_pct * 100.0
        );
    }
    println!("{}", "=".repeat(100));
    if let Some(best) = outcome.best() {
        println!(
            "Best: TP {} / SL {} (PF {}, PnL ${:.2})",
            format_pct(best.config.profit_target_pct),
            format_pct(best.config.stop_loss_pct),
            format_profit_factor(best.summary.profit_factor),
            best.summary.total_pnl_usd
        );
    }

    let path = write_results(&config.backtest.results_dir, "optimize", &outcome)?;
    println!("Results saved to {}", path.display());

    info!("Optimization completed successfully");
    Ok(())
}
