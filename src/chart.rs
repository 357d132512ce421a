//! Price and moving-average lines for the dashboard chart.

use crate::model::{Series, Symbol};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use ta::Next;
use ta::indicators::SimpleMovingAverage;

pub const OVERLAY_WINDOWS: [usize; 3] = [20, 50, 200];

/// Points are `(x, price)` with `x` the candle index inside the visible window.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    pub symbol: Symbol,
    pub closes: Vec<(f64, f64)>,
    /// One line per entry of `OVERLAY_WINDOWS`; empty when history is too short.
    pub overlays: Vec<(usize, Vec<(f64, f64)>)>,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

impl ChartData {
    /// Shows the last `visible` candles; averages use all of the series so the
    /// long windows are already warmed up at the left edge.
    pub fn from_series(symbol: Symbol, series: &Series, visible: usize) -> Result<Self> {
        let candles = series.candles();
        let start = candles.len().saturating_sub(visible);

        let closes = candles[start..]
            .iter()
            .enumerate()
            .map(|(i, c)| (i as f64, c.close))
            .collect();

        let mut overlays = Vec::with_capacity(OVERLAY_WINDOWS.len());
        for window in OVERLAY_WINDOWS {
            let mut sma = SimpleMovingAverage::new(window).map_err(|e| anyhow!("{e:?}"))?;
            let line = candles
                .iter()
                .enumerate()
                .map(|(i, c)| (i, sma.next(c)))
                .filter(|(i, _)| *i + 1 >= window && *i >= start)
                .map(|(i, v)| ((i - start) as f64, v))
                .collect();
            overlays.push((window, line));
        }

        Ok(Self {
            symbol,
            closes,
            overlays,
            first: candles.get(start).map(|c| c.timestamp),
            last: candles.last().map(|c| c.timestamp),
        })
    }

    pub fn x_bounds(&self) -> [f64; 2] {
        [0.0, (self.closes.len().saturating_sub(1)).max(1) as f64]
    }

    /// Min/max over every line, padded by 2%.
    pub fn y_bounds(&self) -> [f64; 2] {
        let values = self
            .closes
            .iter()
            .chain(self.overlays.iter().flat_map(|(_, line)| line.iter()))
            .map(|(_, y)| *y);
        let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| {
            (lo.min(y), hi.max(y))
        });
        if !lo.is_finite() || !hi.is_finite() {
            return [0.0, 1.0];
        }
        let pad = ((hi - lo) * 0.02).max(hi.abs() * 0.001);
        [lo - pad, hi + pad]
    }
}
