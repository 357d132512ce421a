//! Dip & volume screener for exchange spot markets.
//!
//! Lists the USDT spot pairs of an exchange, pulls recent daily candles for
//! each, and keeps the pairs trading near their moving averages on a volume
//! surge (optionally oversold by RSI).

pub mod chart;
pub mod config;
pub mod filter;
pub mod gateway;
pub mod indicators;
pub mod model;
pub mod report;
pub mod scanner;
pub mod tui;

pub use filter::FilterConfig;
pub use gateway::{BinanceGateway, Exchange, GateioGateway, GatewayError, MarketDataGateway};
pub use model::{Candle, Series, Symbol, Timeframe};
pub use scanner::{ScanReport, ScanRow, Scanner};
