//! Moving averages, RSI and volume ratio over a candle series.
//!
//! Windowed values are `None` until enough observations exist. All functions
//! are pure and return one value per input point.

use crate::model::Series;

pub const MA_WINDOWS: [usize; 3] = [20, 50, 200];
pub const RSI_PERIOD: usize = 14;
pub const VOLUME_WINDOW: usize = 20;

/// Largest window any indicator reads; gateways fetch this much warm-up history.
pub const MAX_WINDOW: usize = 200;

/// Trailing arithmetic mean of the last `window` values ending at each point.
///
/// Each window is summed afresh, so there is no running-sum drift. A window
/// of identical values yields that value exactly.
pub fn sma(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                None
            } else {
                Some(mean(&values[i + 1 - window..=i]))
            }
        })
        .collect()
}

/// Neumaier-compensated mean of a non-empty slice.
fn mean(slice: &[f64]) -> f64 {
    let first = slice[0];
    if slice.iter().all(|&v| v == first) {
        return first;
    }
    let mut sum = 0.0;
    let mut compensation = 0.0;
    for &v in slice {
        let t = sum + v;
        if sum.abs() >= v.abs() {
            compensation += (sum - t) + v;
        } else {
            compensation += (v - t) + sum;
        }
        sum = t;
    }
    (sum + compensation) / slice.len() as f64
}

/// Relative strength index with simple (not Wilder) averaging of gains and losses.
///
/// The first defined value is at index `period`. Returns `Some(100.0)` when
/// there are gains but no losses, and `None` for a perfectly flat window.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = closes.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }

    let gains: Vec<f64> = closes.windows(2).map(|w| (w[1] - w[0]).max(0.0)).collect();
    let losses: Vec<f64> = closes.windows(2).map(|w| (w[0] - w[1]).max(0.0)).collect();

    // deltas[k] belongs to close index k + 1
    for i in period..n {
        let from = i - period;
        let avg_gain = gains[from..i].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[from..i].iter().sum::<f64>() / period as f64;
        out[i] = rsi_from_averages(avg_gain, avg_loss);
    }
    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return None;
        }
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Latest volume divided by its trailing average; 0 when the average is 0 or undefined.
pub fn volume_ratio(latest: f64, average: Option<f64>) -> f64 {
    match average {
        Some(avg) if avg > 0.0 => latest / avg,
        _ => 0.0,
    }
}

/// Indicator values at the most recent candle of a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub close: f64,
    pub prev_close: f64,
    pub pct_change: f64,
    pub ma20: Option<f64>,
    pub ma50: Option<f64>,
    pub ma200: Option<f64>,
    pub rsi: Option<f64>,
    pub volume: f64,
    pub avg_volume: Option<f64>,
    pub volume_ratio: f64,
}

impl Snapshot {
    /// `None` for series with fewer than two candles.
    pub fn from_series(series: &Series) -> Option<Self> {
        let candles = series.candles();
        if candles.len() < 2 {
            return None;
        }
        let last = candles[candles.len() - 1];
        let prev = candles[candles.len() - 2];

        let closes = series.closes();
        let volumes = series.volumes();
        let latest = |v: Vec<Option<f64>>| v.last().copied().flatten();

        let avg_volume = latest(sma(&volumes, VOLUME_WINDOW));
        let pct_change = if prev.close != 0.0 {
            (last.close - prev.close) / prev.close * 100.0
        } else {
            0.0
        };

        Some(Self {
            close: last.close,
            prev_close: prev.close,
            pct_change,
            ma20: latest(sma(&closes, MA_WINDOWS[0])),
            ma50: latest(sma(&closes, MA_WINDOWS[1])),
            ma200: latest(sma(&closes, MA_WINDOWS[2])),
            rsi: latest(rsi(&closes, RSI_PERIOD)),
            volume: last.volume,
            avg_volume,
            volume_ratio: volume_ratio(last.volume, avg_volume),
        })
    }
}
