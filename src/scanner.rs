//! The scan-and-filter pipeline.
//!
//! 1. Lists the symbol universe from the gateway.
//! 2. Fetches a candle series per symbol, a bounded number at a time.
//! 3. Computes the indicator snapshot and runs the filter predicate.
//!
//! A failing symbol is skipped and reported; it never aborts the scan.

use crate::filter::{FilterConfig, FilterConfigError, Predicate, Verdict};
use crate::gateway::{GatewayError, MarketDataGateway};
use crate::indicators::Snapshot;
use crate::model::{Symbol, Timeframe};
use futures::StreamExt;
use futures::stream;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Series shorter than this are not scanned.
pub const MIN_HISTORY: usize = 30;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("could not load the symbol universe: {0}")]
    Universe(#[from] GatewayError),
    #[error("the exchange returned no tradable symbols")]
    EmptyUniverse,
    #[error("invalid filter settings: {0}")]
    InvalidFilter(#[from] FilterConfigError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("{0}")]
    Fetch(#[from] GatewayError),
    #[error("only {candles} candles, need {}", MIN_HISTORY)]
    InsufficientHistory { candles: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Skipped {
    pub symbol: Symbol,
    pub reason: SkipReason,
}

/// One accepted symbol, rounded for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRow {
    pub symbol: Symbol,
    pub close: f64,
    pub pct_change: f64,
    pub ma20: Option<f64>,
    pub ma50: Option<f64>,
    pub rsi: Option<f64>,
    pub volume_ratio: f64,
}

impl ScanRow {
    fn new(symbol: Symbol, snap: &Snapshot) -> Self {
        Self {
            symbol,
            close: round_to(snap.close, 4),
            pct_change: round_to(snap.pct_change, 2),
            ma20: snap.ma20.map(|v| round_to(v, 4)),
            ma50: snap.ma50.map(|v| round_to(v, 4)),
            rsi: snap.rsi.map(|v| round_to(v, 2)),
            volume_ratio: round_to(snap.volume_ratio, 2),
        }
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Outcome of a scan, in universe order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    pub universe: usize,
    pub rows: Vec<ScanRow>,
    pub rejected: usize,
    pub skipped: Vec<Skipped>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug)]
enum Outcome {
    Accepted(ScanRow),
    Rejected,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanSettings {
    pub timeframe: Timeframe,
    pub lookback_days: u32,
    /// Symbols fetched at the same time. The gateway's request budget still applies.
    pub max_concurrency: usize,
}

impl ScanSettings {
    /// Candles covering the lookback window, without indicator warm-up.
    pub fn lookback_candles(&self) -> usize {
        self.lookback_days
            .saturating_mul(self.timeframe.candles_per_day()) as usize
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::OneDay,
            lookback_days: 90,
            max_concurrency: 8,
        }
    }
}

pub struct Scanner<G> {
    gateway: Arc<G>,
    settings: ScanSettings,
}

impl<G> Clone for Scanner<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            settings: self.settings,
        }
    }
}

impl<G: MarketDataGateway> Scanner<G> {
    pub fn new(gateway: Arc<G>, settings: ScanSettings) -> Self {
        Self { gateway, settings }
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Lists the universe and scans it.
    pub async fn run(&self, config: &FilterConfig) -> Result<ScanReport, ScanError> {
        config.validate()?;
        let symbols = self.gateway.list_usdt_spot_symbols().await?;
        if symbols.is_empty() {
            return Err(ScanError::EmptyUniverse);
        }
        Ok(self.scan(&symbols, config).await)
    }

    /// Evaluates every symbol independently. Rows keep the order of `symbols`.
    pub async fn scan(&self, symbols: &[Symbol], config: &FilterConfig) -> ScanReport {
        let predicate = Predicate::from(config);
        info!(
            exchange = self.gateway.name(),
            universe = symbols.len(),
            ?config,
            "scan started"
        );

        // Step 1: Fetch and evaluate, a bounded number of symbols in flight
        let evaluations: Vec<_> = symbols
            .iter()
            .enumerate()
            .map(|(idx, symbol)| {
                let predicate = &predicate;
                async move { (idx, self.evaluate(symbol, predicate).await) }
            })
            .collect();
        let mut outcomes: Vec<(usize, Outcome)> = stream::iter(evaluations)
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;
        // Step 2: Restore universe order
        outcomes.sort_by_key(|(idx, _)| *idx);

        // Step 3: Tally outcomes into the report
        let mut report = ScanReport {
            universe: symbols.len(),
            ..ScanReport::default()
        };
        for (idx, outcome) in outcomes {
            match outcome {
                Outcome::Accepted(row) => report.rows.push(row),
                Outcome::Rejected => report.rejected += 1,
                Outcome::Skipped(reason) => report.skipped.push(Skipped {
                    symbol: symbols[idx].clone(),
                    reason,
                }),
            }
        }

        info!(
            matches = report.rows.len(),
            rejected = report.rejected,
            skipped = report.skipped.len(),
            "scan finished"
        );
        report
    }

    async fn evaluate(&self, symbol: &Symbol, predicate: &Predicate) -> Outcome {
        // 1. Fetch the candle series
        let series = match self
            .gateway
            .fetch_series(symbol, self.settings.timeframe, self.settings.lookback_days)
            .await
        {
            Ok(series) => series,
            Err(err) => {
                warn!(%symbol, error = %err, "skipping symbol");
                return Outcome::Skipped(err.into());
            }
        };

        // 2. Require enough history
        if series.len() < MIN_HISTORY {
            debug!(%symbol, candles = series.len(), "insufficient history");
            return Outcome::Skipped(SkipReason::InsufficientHistory {
                candles: series.len(),
            });
        }

        // 3. Compute indicators at the latest candle
        let Some(snap) = Snapshot::from_series(&series) else {
            return Outcome::Skipped(SkipReason::InsufficientHistory {
                candles: series.len(),
            });
        };

        // 4. Apply the filter
        match predicate.evaluate(&snap) {
            Verdict::Accepted => {
                debug!(%symbol, close = snap.close, ratio = snap.volume_ratio, "match");
                Outcome::Accepted(ScanRow::new(symbol.clone(), &snap))
            }
            Verdict::Rejected(rule) => {
                debug!(%symbol, %rule, "rejected");
                Outcome::Rejected
            }
        }
    }
}
