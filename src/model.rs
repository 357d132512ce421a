//! Market data types shared by the gateways, the indicator engine and the scanner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A spot trading pair, normalized to `BASE/QUOTE` in upper case (e.g. `BTC/USDT`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(base: &str, quote: &str) -> Self {
        Self(format!(
            "{}/{}",
            base.trim().to_ascii_uppercase(),
            quote.trim().to_ascii_uppercase()
        ))
    }

    /// Parses `BASE/QUOTE`, `BASE_QUOTE` or `BASE-QUOTE` in any case.
    pub fn parse(raw: &str) -> Option<Self> {
        let (base, quote) = raw.split_once(['/', '_', '-'])?;
        if base.trim().is_empty() || quote.trim().is_empty() {
            return None;
        }
        Some(Self::new(base, quote))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn base(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(b, _)| b)
    }

    pub fn quote(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, q)| q)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[default]
    #[serde(rename = "1d")]
    OneDay,
}

impl Timeframe {
    /// Interval string understood by both Binance and Gate.io.
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::OneHour => "1h",
            Timeframe::FourHours => "4h",
            Timeframe::OneDay => "1d",
        }
    }

    pub fn candles_per_day(self) -> u32 {
        match self {
            Timeframe::OneHour => 24,
            Timeframe::FourHours => 6,
            Timeframe::OneDay => 1,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One OHLCV observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

// Lets the `ta` indicators consume candles directly.
impl ta::Open for Candle {
    fn open(&self) -> f64 {
        self.open
    }
}

impl ta::High for Candle {
    fn high(&self) -> f64 {
        self.high
    }
}

impl ta::Low for Candle {
    fn low(&self) -> f64 {
        self.low
    }
}

impl ta::Close for Candle {
    fn close(&self) -> f64 {
        self.close
    }
}

impl ta::Volume for Candle {
    fn volume(&self) -> f64 {
        self.volume
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("duplicate candle at {0}")]
    DuplicateTimestamp(DateTime<Utc>),
    #[error("invalid candle at {timestamp}: {reason}")]
    InvalidCandle {
        timestamp: DateTime<Utc>,
        reason: &'static str,
    },
}

/// Candles for one symbol and timeframe, strictly increasing by timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    candles: Vec<Candle>,
}

impl Series {
    /// Sorts the candles by time and validates them.
    pub fn new(mut candles: Vec<Candle>) -> Result<Self, SeriesError> {
        candles.sort_by_key(|c| c.timestamp);

        for pair in candles.windows(2) {
            if pair[0].timestamp == pair[1].timestamp {
                return Err(SeriesError::DuplicateTimestamp(pair[1].timestamp));
            }
        }

        for c in &candles {
            let prices = [c.open, c.high, c.low, c.close];
            if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
                return Err(SeriesError::InvalidCandle {
                    timestamp: c.timestamp,
                    reason: "prices must be positive",
                });
            }
            if !c.volume.is_finite() || c.volume < 0.0 {
                return Err(SeriesError::InvalidCandle {
                    timestamp: c.timestamp,
                    reason: "volume must be non-negative",
                });
            }
        }

        Ok(Self { candles })
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }
}
