use super::wire::{millis_to_utc, number_at};
use super::{
    GatewayError, GatewayOptions, MarketDataGateway, RequestBudget, candles_to_request,
    http_client, retry_after,
};
use crate::model::{Candle, Series, Symbol, Timeframe};
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
/// Published REQUEST_WEIGHT limit for the spot API.
const WEIGHT_PER_MINUTE: u32 = 6000;
const EXCHANGE_INFO_WEIGHT: u32 = 20;
const MAX_KLINES: u32 = 1000;
const UNKNOWN_SYMBOL_CODE: &str = "-1121";

static BAN_UNTIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"until\s+(\d+)").expect("ban pattern is a valid regex"));

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    status: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    is_spot_trading_allowed: bool,
    #[serde(default)]
    permissions: Vec<String>,
}

impl SymbolInfo {
    fn is_spot(&self) -> bool {
        self.is_spot_trading_allowed || self.permissions.iter().any(|p| p == "SPOT")
    }
}

/// Weight of `GET /api/v3/klines` by page size.
fn klines_weight(limit: u32) -> u32 {
    match limit {
        0..=99 => 1,
        100..=499 => 2,
        500..=1000 => 5,
        _ => 10,
    }
}

/// Reads the "IP banned until <ms>" deadline out of a 418/429 body.
fn banned_until(body: &str) -> Option<DateTime<Utc>> {
    let caps = BAN_UNTIL.captures(body)?;
    let ms = caps.get(1)?.as_str().parse::<i64>().ok()?;
    DateTime::from_timestamp_millis(ms)
}

/// Binance spot REST adapter.
pub struct BinanceGateway {
    client: Client,
    base_url: String,
    quote_asset: String,
    budget: RequestBudget,
}

impl BinanceGateway {
    pub fn new(options: &GatewayOptions) -> Result<Self, GatewayError> {
        Ok(Self {
            client: http_client(options)?,
            base_url: options
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            quote_asset: options.quote_asset.to_ascii_uppercase(),
            budget: RequestBudget::per_minute(
                options.requests_per_minute.unwrap_or(WEIGHT_PER_MINUTE),
            ),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        weight: u32,
        symbol: Option<&Symbol>,
    ) -> Result<T, GatewayError> {
        self.budget.acquire(weight).await?;

        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();

        if status == StatusCode::IM_A_TEAPOT || status == StatusCode::TOO_MANY_REQUESTS {
            let wait = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            if let Some(until) = banned_until(&body) {
                let remaining = (until - Utc::now()).to_std().unwrap_or_default();
                self.budget.pause_for(remaining + Duration::from_secs(5));
                return Err(GatewayError::Banned { until });
            }
            self.budget.pause_for(wait.unwrap_or(Duration::from_secs(60)));
            return Err(GatewayError::RateLimited { retry_after: wait });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Some(symbol) = symbol {
                if body.contains(UNKNOWN_SYMBOL_CODE) {
                    return Err(GatewayError::UnknownSymbol(symbol.clone()));
                }
            }
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

fn parse_kline(row: &[Value]) -> Result<Candle, GatewayError> {
    Ok(Candle {
        timestamp: millis_to_utc(number_at(row, 0, "openTime")?)?,
        open: number_at(row, 1, "open")?,
        high: number_at(row, 2, "high")?,
        low: number_at(row, 3, "low")?,
        close: number_at(row, 4, "close")?,
        volume: number_at(row, 5, "volume")?,
    })
}

impl MarketDataGateway for BinanceGateway {
    fn name(&self) -> &str {
        "Binance"
    }

    async fn list_usdt_spot_symbols(&self) -> Result<Vec<Symbol>, GatewayError> {
        let info: ExchangeInfo = self
            .get_json("/api/v3/exchangeInfo", &[], EXCHANGE_INFO_WEIGHT, None)
            .await?;

        let mut symbols: Vec<Symbol> = info
            .symbols
            .iter()
            .filter(|s| s.status == "TRADING" && s.is_spot())
            .filter(|s| s.quote_asset.eq_ignore_ascii_case(&self.quote_asset))
            .map(|s| Symbol::new(&s.base_asset, &s.quote_asset))
            .collect();
        symbols.sort();
        symbols.dedup();

        debug!(count = symbols.len(), quote = %self.quote_asset, "loaded Binance spot symbols");
        Ok(symbols)
    }

    async fn fetch_series(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        lookback_days: u32,
    ) -> Result<Series, GatewayError> {
        let limit = candles_to_request(timeframe, lookback_days, MAX_KLINES);
        let query = [
            ("symbol", format!("{}{}", symbol.base(), symbol.quote())),
            ("interval", timeframe.as_str().to_string()),
            ("limit", limit.to_string()),
        ];

        let rows: Vec<Vec<Value>> = self
            .get_json("/api/v3/klines", &query, klines_weight(limit), Some(symbol))
            .await?;

        let candles = rows
            .iter()
            .map(|row| parse_kline(row))
            .collect::<Result<Vec<_>, _>>()?;

        Series::new(candles).map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ban_deadline_is_parsed() {
        let body = r#"{"code":-1003,"msg":"Way too many requests; IP banned until 1700000000000."}"#;
        assert_eq!(banned_until(body).unwrap().timestamp_millis(), 1_700_000_000_000);
        assert!(banned_until(r#"{"code":-1003,"msg":"Too many requests"}"#).is_none());
    }

    #[test]
    fn kline_weight_by_limit() {
        assert_eq!(klines_weight(90), 1);
        assert_eq!(klines_weight(290), 2);
        assert_eq!(klines_weight(1000), 5);
    }

    #[test]
    fn kline_row_parses_string_prices() {
        let row = vec![
            json!(1_700_006_400_000_i64),
            json!("35000.10"),
            json!("36000.00"),
            json!("34000.50"),
            json!("35500.00"),
            json!("1234.5"),
            json!(1_700_092_799_999_i64),
            json!("43000000.0"),
        ];
        let candle = parse_kline(&row).unwrap();
        assert_eq!(candle.close, 35500.0);
        assert_eq!(candle.volume, 1234.5);
        assert_eq!(candle.timestamp.timestamp_millis(), 1_700_006_400_000);
    }

    #[test]
    fn spot_detection_accepts_either_flag() {
        let info: SymbolInfo = serde_json::from_value(json!({
            "status": "TRADING",
            "baseAsset": "BTC",
            "quoteAsset": "USDT",
            "permissions": ["SPOT", "MARGIN"]
        }))
        .unwrap();
        assert!(info.is_spot());
        let info: SymbolInfo = serde_json::from_value(json!({
            "status": "TRADING",
            "baseAsset": "BTC",
            "quoteAsset": "USDT",
            "isSpotTradingAllowed": false
        }))
        .unwrap();
        assert!(!info.is_spot());
    }
}
