//! Exchange access: the `MarketDataGateway` trait and its spot-market adapters.
//!
//! Adapters own everything exchange-specific (URLs, symbol spelling, request
//! weights, ban handling). The scanner only sees normalized `Symbol`s and
//! validated `Series`.

mod binance;
mod gateio;
mod rate_limit;
mod wire;

pub use binance::BinanceGateway;
pub use gateio::GateioGateway;
pub use rate_limit::RequestBudget;

use crate::indicators::MAX_WINDOW;
use crate::model::{Series, Symbol, Timeframe};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("exchange returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("rate limited by exchange{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("IP banned by exchange until {until}")]
    Banned { until: DateTime<Utc> },

    #[error("unknown or delisted symbol {0}")]
    UnknownSymbol(Symbol),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request weight {weight} exceeds the request budget")]
    InsufficientCapacity { weight: u32 },
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(" (retry after {}s)", d.as_secs()))
        .unwrap_or_default()
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::Malformed(err.to_string())
        } else {
            GatewayError::Connection(err.to_string())
        }
    }
}

/// Source of symbols and candles for one exchange's spot market.
pub trait MarketDataGateway: Send + Sync {
    fn name(&self) -> &str;

    /// Sorted, de-duplicated spot pairs quoted in the configured quote asset.
    fn list_usdt_spot_symbols(
        &self,
    ) -> impl Future<Output = Result<Vec<Symbol>, GatewayError>> + Send;

    /// Fetches `lookback_days` worth of candles plus warm-up history for the
    /// longest indicator window. Returning fewer candles is not an error.
    fn fetch_series(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        lookback_days: u32,
    ) -> impl Future<Output = Result<Series, GatewayError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    #[default]
    Binance,
    Gateio,
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exchange::Binance => f.write_str("Binance"),
            Exchange::Gateio => f.write_str("Gate.io"),
        }
    }
}

/// Settings shared by every adapter.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Overrides the public API root, e.g. for a mock server.
    pub base_url: Option<String>,
    pub quote_asset: String,
    pub request_timeout: Duration,
    /// Overrides the exchange's published request budget.
    pub requests_per_minute: Option<u32>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            quote_asset: "USDT".to_string(),
            request_timeout: Duration::from_secs(10),
            requests_per_minute: None,
        }
    }
}

/// Candles needed to cover the lookback plus indicator warm-up, capped at the
/// exchange's page size.
pub(crate) fn candles_to_request(timeframe: Timeframe, lookback_days: u32, max_page: u32) -> u32 {
    let wanted = lookback_days
        .saturating_mul(timeframe.candles_per_day())
        .saturating_add(MAX_WINDOW as u32);
    wanted.min(max_page)
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

pub(crate) fn http_client(options: &GatewayOptions) -> Result<reqwest::Client, GatewayError> {
    Ok(reqwest::Client::builder()
        .pool_max_idle_per_host(50)
        .timeout(options.request_timeout)
        .build()?)
}
