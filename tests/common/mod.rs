#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use dip_screener::{Candle, FilterConfig, Series};
use serde_json::{Value, json};

pub const DAY_MS: i64 = 86_400_000;

pub fn day(i: usize) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 - 1_700_000_000_000 % DAY_MS + i as i64 * DAY_MS)
        .unwrap()
}

pub fn series_from(closes: &[f64], volumes: &[f64]) -> Series {
    let candles = closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| Candle {
            timestamp: day(i),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume,
        })
        .collect();
    Series::new(candles).unwrap()
}

/// Volume 100 everywhere except a last-candle spike of 300 (ratio 300/110).
pub fn spike_volumes(n: usize) -> Vec<f64> {
    let mut volumes = vec![100.0; n];
    if let Some(last) = volumes.last_mut() {
        *last = 300.0;
    }
    volumes
}

/// 90 closes falling by 1 a day from 200 to 111: far under MA20, RSI 0.
pub fn dip_closes() -> Vec<f64> {
    (0..90).map(|i| 200.0 - i as f64).collect()
}

pub fn dip_series() -> Series {
    series_from(&dip_closes(), &spike_volumes(90))
}

/// 60 days at 200, a crash to 100, then 29 straight up days to 129.
/// Under MA50 but RSI 100.
pub fn rebound_series() -> Series {
    let mut closes = vec![200.0; 60];
    closes.extend((0..30).map(|i| 100.0 + i as f64));
    series_from(&closes, &spike_volumes(90))
}

/// Flat volume: ratio 1.0, price well above every average.
pub fn rally_series() -> Series {
    let closes: Vec<f64> = (0..90).map(|i| 100.0 + 2.0 * i as f64).collect();
    series_from(&closes, &vec![100.0; 90])
}

pub fn strict_filters() -> FilterConfig {
    FilterConfig {
        ma_tolerance: 0.05,
        volume_threshold: 1.5,
        rsi_threshold: 30.0,
        use_ma: true,
        use_rsi: true,
    }
}

/// Binance `/api/v3/klines` rows for a series.
pub fn binance_klines(series: &Series) -> Value {
    let rows: Vec<Value> = series
        .candles()
        .iter()
        .map(|c| {
            let open_time = c.timestamp.timestamp_millis();
            json!([
                open_time,
                c.open.to_string(),
                c.high.to_string(),
                c.low.to_string(),
                c.close.to_string(),
                c.volume.to_string(),
                open_time + DAY_MS - 1,
                "0",
                10,
                "0",
                "0",
                "0"
            ])
        })
        .collect();
    Value::Array(rows)
}

/// Gate.io `/spot/candlesticks` rows for a series.
pub fn gateio_candlesticks(series: &Series) -> Value {
    let rows: Vec<Value> = series
        .candles()
        .iter()
        .map(|c| {
            json!([
                c.timestamp.timestamp().to_string(),
                (c.volume * c.close).to_string(),
                c.close.to_string(),
                c.high.to_string(),
                c.low.to_string(),
                c.open.to_string(),
                c.volume.to_string(),
                "true"
            ])
        })
        .collect();
    Value::Array(rows)
}
