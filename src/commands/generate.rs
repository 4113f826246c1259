//! Generate command implementation

use anyhow::Result;
use tpsl_backtester::{data, generator, Config};
use tracing::info;

pub fn run(
    config_path: Option<String>,
    start_price: Option<f64>,
    count: Option<usize>,
    volatility: Option<f64>,
    interval_ms: Option<i64>,
    seed: u64,
    output: String,
) -> Result<()> {
    let config = match config_path {
        Some(path) => {
            info!("Loaded configuration from: {}", path);
            Config::from_file(&path)?
        }
        None => Config::default(),
    };

    let mut params = config.generator;
    if let Some(price) = start_price {
        params.start_price = price;
    }
    if let Some(count) = count {
        params.count = count;
    }
    if let Some(volatility) = volatility {
        params.volatility_pct = volatility;
    }
    if let Some(interval) = interval_ms {
        params.interval_ms = interval;
    }
    if params.end_anchor_ms == 0 {
        params.end_anchor_ms = chrono::Utc::now().timestamp_millis();
    }

    info!("Generating {} candles with seed {}", params.count, seed);
    let candles = generator::generate_seeded(&params, seed)?;
    data::save_csv(&output, &candles)?;

    println!("Wrote {} candles to {}", candles.len(), output);
    if let (Some(first), Some(last)) = (candles.first(), candles.last()) {
        let stamp = |c: &tpsl_backtester::PriceCandle| match c.datetime() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => c.timestamp.to_string(),
        };
        println!("  From:  {}", stamp(first));
        println!("  To:    {}", stamp(last));
        println!("  Open:  {:.4}", first.open);
        println!("  Close: {:.4}", last.close);
    }

    Ok(())
}
