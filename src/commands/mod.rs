//! Subcommand implementations and shared helpers

pub mod backtest;
pub mod generate;
pub mod optimize;

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use tpsl_backtester::{data, generator, Config, PriceCandle};

/// Load candles from CSV, or generate them from the config's generator section
pub fn load_candles(config: &Config, data_path: Option<&str>, seed: u64) -> Result<Vec<PriceCandle>> {
    match data_path {
        Some(path) => data::load_csv(path),
        None => {
            let mut params = config.generator.clone();
            if params.end_anchor_ms == 0 {
                params.end_anchor_ms = chrono::Utc::now().timestamp_millis();
            }
            info!(
                "Generating {} synthetic candles (seed {}, volatility {})",
                params.count, seed, params.volatility_pct
            );
            Ok(generator::generate_seeded(&params, seed)?)
        }
    }
}

/// Write `value` as pretty JSON to `{results_dir}/{prefix}_{timestamp}.json`
pub fn write_results<T: Serialize>(results_dir: &str, prefix: &str, value: &T) -> Result<PathBuf> {
    let dir = Path::new(results_dir);
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create results directory {}", dir.display()))?;

    let filename = format!(
        "{}_{}.json",
        prefix,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let path = dir.join(filename);
    let json = serde_json::to_string_pretty(value).context("Failed to serialize results")?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write results to {}", path.display()))?;

    info!("Results written to {}", path.display());
    Ok(path)
}

/// Profit factor for display; infinite when there were no losing trades
pub fn format_profit_factor(pf: f64) -> String {
    if pf.is_infinite() {
        "inf".to_string()
    } else {
        format!("{:.2}", pf)
    }
}
