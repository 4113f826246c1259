//! Candle data loading and saving
//!
//! CSV files with a `timestamp,open,high,low,close` header, where
//! `timestamp` is milliseconds since the Unix epoch.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::backtest::validate_candles;
use crate::PriceCandle;

/// Load candles from a CSV file and validate the series
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<PriceCandle>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut candles = Vec::new();
    for (row_idx, record) in reader.deserialize::<PriceCandle>().enumerate() {
        let candle = record.with_context(|| format!("Failed to read row {}", row_idx + 1))?;
        candles.push(candle);
    }

    validate_candles(&candles)
        .with_context(|| format!("Invalid candle data in {}", path.display()))?;

    info!("Loaded {} candles from {}", candles.len(), path.display());
    Ok(candles)
}

/// Write candles to a CSV file, creating parent directories as needed
pub fn save_csv(path: impl AsRef<Path>, candles: &[PriceCandle]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file {}", path.display()))?;
    for candle in candles {
        writer.serialize(candle).context("Failed to write candle")?;
    }
    writer.flush().context("Failed to flush CSV writer")?;

    info!("Saved {} candles to {}", candles.len(), path.display());
    Ok(())
}
