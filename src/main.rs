//! TP/SL backtester - main entry point
//!
//! This binary provides three subcommands:
//! - generate: Write synthetic candles to CSV
//! - backtest: Run a single strategy backtest
//! - optimize: Sweep a take-profit/stop-loss grid

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "tpsl-backtester")]
#[command(about = "Take-profit/stop-loss strategy backtesting and grid optimization", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate synthetic candles
    Generate {
        /// Path to configuration file (generator section)
        #[arg(short, long)]
        config: Option<String>,

        /// Starting price
        #[arg(long)]
        start_price: Option<f64>,

        /// Number of candles
        #[arg(long)]
        count: Option<usize>,

        /// Per-candle volatility as a fraction (0.002 = 0.2%)
        #[arg(long)]
        volatility: Option<f64>,

        /// Candle interval in milliseconds
        #[arg(long)]
        interval_ms: Option<i64>,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output CSV path
        #[arg(short, long, default_value = "data/candles.csv")]
        output: String,
    },

    /// Run strategy backtest
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Candle CSV file (synthetic candles are generated when omitted)
        #[arg(short, long)]
        data: Option<String>,

        /// Seed for synthetic candles
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Profit target as a fraction (overrides config)
        #[arg(long)]
        tp: Option<f64>,

        /// Stop loss as a fraction (overrides config)
        #[arg(long)]
        sl: Option<f64>,

        /// Leverage multiplier (overrides config)
        #[arg(long)]
        leverage: Option<f64>,

        /// Starting capital in USDC (overrides config)
        #[arg(long)]
        capital: Option<f64>,

        /// Directional bias: long, short or alternate
        #[arg(long)]
        bias: Option<String>,

        /// Same-candle TP/SL resolution: tp-first, sl-first or worst-case
        #[arg(long)]
        tie_break: Option<String>,

        /// Number of trades to print
        #[arg(long, default_value = "10")]
        show_trades: usize,
    },

    /// Optimize take-profit/stop-loss thresholds
    Optimize {
        /// Path to base configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Candle CSV file (synthetic candles are generated when omitted)
        #[arg(short, long)]
        data: Option<String>,

        /// Seed for synthetic candles
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Take-profit values to test (comma-separated). E.g., "0.001,0.002" or "0.1%,0.2%"
        #[arg(long)]
        tp_grid: Option<String>,

        /// Stop-loss values to test (comma-separated). E.g., "0.0005,0.001"
        #[arg(long)]
        sl_grid: Option<String>,

        /// Use the small quick grid
        #[arg(long)]
        quick: bool,

        /// Number of top results to show
        #[arg(short, long, default_value = "5")]
        top: usize,

        /// Run sequentially instead of parallel
        #[arg(long)]
        sequential: bool,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if file_only {
        // Optimizer logs to file only so the progress bar stays readable
        let file_appender = tracing_appender::rolling::never("logs", &log_filename);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_appender = tracing_appender::rolling::never("logs", &log_filename);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Generate { .. } => ("generate", false),
        Commands::Backtest { .. } => ("backtest", false),
        Commands::Optimize { .. } => ("optimize", true),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Generate {
            config,
            start_price,
            count,
            volatility,
            interval_ms,
            seed,
            output,
        } => commands::generate::run(config, start_price, count, volatility, interval_ms, seed, output),

        Commands::Backtest {
            config,
            data,
            seed,
            tp,
            sl,
            leverage,
            capital,
            bias,
            tie_break,
            show_trades,
        } => commands::backtest::run(commands::backtest::BacktestArgs {
            config_path: config,
            data,
            seed,
            tp,
            sl,
            leverage,
            capital,
            bias,
            tie_break,
            show_trades,
        }),

        Commands::Optimize {
            config,
            data,
            seed,
            tp_grid,
            sl_grid,
            quick,
            top,
            sequential,
        } => commands::optimize::run(commands::optimize::OptimizeArgs {
            config_path: config,
            data,
            seed,
            tp_grid,
            sl_grid,
            quick,
            top,
            sequential,
        }),
    }
}
