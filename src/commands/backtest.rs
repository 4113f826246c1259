//! Backtest command implementation

use anyhow::{anyhow, Result};
use tpsl_backtester::{simulate_with_policy, Bias, Config, TieBreak};
use tracing::{info, warn};

use super::{format_profit_factor, load_candles, write_results};

pub struct BacktestArgs {
    pub config_path: String,
    pub data: Option<String>,
    pub seed: u64,
    pub tp: Option<f64>,
    pub sl: Option<f64>,
    pub leverage: Option<f64>,
    pub capital: Option<f64>,
    pub bias: Option<String>,
    pub tie_break: Option<String>,
    pub show_trades: usize,
}

pub fn run(args: BacktestArgs) -> Result<()> {
    info!("Starting backtest");

    let mut config = Config::from_file(&args.config_path)?;
    info!("Loaded configuration from: {}", args.config_path);

    // Apply overrides
    if let Some(tp) = args.tp {
        info!("Overriding profit target to: {}", tp);
        config.strategy.profit_target_pct = tp;
    }
    if let Some(sl) = args.sl {
        info!("Overriding stop loss to: {}", sl);
        config.strategy.stop_loss_pct = sl;
    }
    if let Some(leverage) = args.leverage {
        info!("Overriding leverage to: {}x", leverage);
        config.strategy.leverage = leverage;
    }
    if let Some(capital) = args.capital {
        info!("Overriding initial capital to: ${:.2}", capital);
        config.strategy.capital_usdc = capital;
    }
    if let Some(bias) = args.bias {
        config.strategy.bias = bias.parse::<Bias>().map_err(|e| anyhow!(e))?;
        info!("Overriding bias to: {}", config.strategy.bias);
    }
    if let Some(tie_break) = args.tie_break {
        config.simulation.tie_break = tie_break.parse::<TieBreak>().map_err(|e| anyhow!(e))?;
        info!("Overriding tie-break to: {}", config.simulation.tie_break);
    }

    let candles = load_candles(&config, args.data.as_deref(), args.seed)?;

    info!("Running backtest on {} candles...", candles.len());
    let result = simulate_with_policy(&candles, &config.strategy, &config.simulation)?;
    for diagnostic in &result.diagnostics {
        warn!("{:?}", diagnostic);
    }

    let s = &result.summary;
    let cfg = &result.config;
    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("Candles:            {}", candles.len());
    println!(
        "Strategy:           TP {:.3}% / SL {:.3}% / {}x / {}",
        cfg.profit_target_pct * 100.0,
        cfg.stop_loss_pct * 100.0,
        cfg.leverage,
        cfg.bias
    );
    println!("Tie-break:          {}", result.policy.tie_break);
    println!("Initial Capital:    ${:.2}", cfg.capital_usdc);
    println!("Final Capital:      ${:.2}", result.final_capital_usd);
    println!("Total PnL:          ${:.2} ({:.2}%)", s.total_pnl_usd, s.total_pnl_pct);
    println!("Win Rate:           {:.2}%", s.win_rate);
    println!("Profit Factor:      {}", format_profit_factor(s.profit_factor));
    println!("Max Drawdown:       {:.2}% (range)", s.max_drawdown_pct * 100.0);
    println!("Seq. Drawdown:      {:.2}%", s.sequential_drawdown_pct * 100.0);
    println!("Total Trades:       {}", s.total_trades);
    println!("Winning Trades:     {}", s.winning_trades);
    println!("Losing Trades:      {}", s.losing_trades);
    println!("Exits TP/SL/Time:   {}/{}/{}", s.tp_exits, s.sl_exits, s.timeout_exits);
    println!("Average Win:        ${:.2}", s.avg_win_usd);
    println!("Average Loss:       ${:.2}", s.avg_loss_usd);
    println!("Avg Duration:       {:.1} min", s.avg_trade_duration_ms / 60_000.0);
    println!("Trades per Hour:    {:.2}", s.trades_per_hour);
    println!("{}", "=".repeat(60));

    if args.show_trades > 0 && !result.trades.is_empty() {
        println!(
            "{:<4} {:<6} {:>12} {:>12} {:<8} {:>10} {:>12}",
            "#", "Dir", "Entry", "Exit", "Reason", "PnL%", "PnL$"
        );
        println!("{}", "-".repeat(72));
        for (i, trade) in result.trades.iter().take(args.show_trades).enumerate() {
            println!(
                "{:<4} {:<6} {:>12.4} {:>12.4} {:<8} {:>10.4} {:>12.2}",
                i + 1,
                trade.direction.to_string(),
                trade.entry_price,
                trade.exit_price,
                trade.exit_reason.to_string(),
                trade.pnl_leveraged * 100.0,
                trade.pnl_usd
            );
        }
        println!("{}", "=".repeat(72));
    }

    let path = write_results(&config.backtest.results_dir, "backtest", &result)?;
    println!("Results saved to {}", path.display());

    info!("Backtest completed successfully");
    Ok(())
}
