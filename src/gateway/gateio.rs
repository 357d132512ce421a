use super::wire::{millis_to_utc, number_at};
use super::{
    GatewayError, GatewayOptions, MarketDataGateway, RequestBudget, candles_to_request,
    http_client, retry_after,
};
use crate::model::{Candle, Series, Symbol, Timeframe};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.gateio.ws/api/v4";
/// Public endpoints allow 200 requests per 10 seconds.
const REQUESTS_PER_WINDOW: u32 = 200;
const WINDOW: Duration = Duration::from_secs(10);
const MAX_CANDLES: u32 = 1000;
const UNKNOWN_PAIR_LABEL: &str = "INVALID_CURRENCY_PAIR";

#[derive(Deserialize, Debug)]
struct CurrencyPair {
    base: String,
    quote: String,
    #[serde(default)]
    trade_status: String,
}

#[derive(Deserialize, Debug, Default)]
struct ErrorBody {
    #[serde(default)]
    label: String,
    #[serde(default)]
    message: String,
}

/// Gate.io spot REST adapter. Pairs are spelled `BTC_USDT` on the wire.
pub struct GateioGateway {
    client: Client,
    base_url: String,
    quote_asset: String,
    budget: RequestBudget,
}

impl GateioGateway {
    pub fn new(options: &GatewayOptions) -> Result<Self, GatewayError> {
        let budget = match options.requests_per_minute {
            Some(limit) => RequestBudget::per_minute(limit),
            None => RequestBudget::new(REQUESTS_PER_WINDOW, WINDOW),
        };
        Ok(Self {
            client: http_client(options)?,
            base_url: options
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            quote_asset: options.quote_asset.to_ascii_uppercase(),
            budget,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        symbol: Option<&Symbol>,
    ) -> Result<T, GatewayError> {
        self.budget.acquire(1).await?;

        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let wait = retry_after(response.headers());
            self.budget.pause_for(wait.unwrap_or(WINDOW));
            return Err(GatewayError::RateLimited { retry_after: wait });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
            if let Some(symbol) = symbol {
                if error.label == UNKNOWN_PAIR_LABEL {
                    return Err(GatewayError::UnknownSymbol(symbol.clone()));
                }
            }
            let body = if error.message.is_empty() {
                body
            } else {
                format!("{}: {}", error.label, error.message)
            };
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<T>().await?)
    }
}

/// Row layout: `[t_secs, quote_volume, close, high, low, open, base_volume, closed]`.
fn parse_candlestick(row: &[Value]) -> Result<Candle, GatewayError> {
    let close = number_at(row, 2, "close")?;
    let volume = match row.len() {
        n if n > 6 => number_at(row, 6, "base_volume")?,
        _ => number_at(row, 1, "quote_volume")? / close,
    };
    Ok(Candle {
        timestamp: millis_to_utc(number_at(row, 0, "t")? * 1000.0)?,
        open: number_at(row, 5, "open")?,
        high: number_at(row, 3, "high")?,
        low: number_at(row, 4, "low")?,
        close,
        volume,
    })
}

impl MarketDataGateway for GateioGateway {
    fn name(&self) -> &str {
        "Gate.io"
    }

    async fn list_usdt_spot_symbols(&self) -> Result<Vec<Symbol>, GatewayError> {
        let pairs: Vec<CurrencyPair> = self.get_json("/spot/currency_pairs", &[], None).await?;

        let mut symbols: Vec<Symbol> = pairs
            .iter()
            .filter(|p| p.trade_status == "tradable")
            .filter(|p| p.quote.eq_ignore_ascii_case(&self.quote_asset))
            .map(|p| Symbol::new(&p.base, &p.quote))
            .collect();
        symbols.sort();
        symbols.dedup();

        debug!(count = symbols.len(), quote = %self.quote_asset, "loaded Gate.io spot symbols");
        Ok(symbols)
    }

    async fn fetch_series(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        lookback_days: u32,
    ) -> Result<Series, GatewayError> {
        let limit = candles_to_request(timeframe, lookback_days, MAX_CANDLES);
        let query = [
            ("currency_pair", format!("{}_{}", symbol.base(), symbol.quote())),
            ("interval", timeframe.as_str().to_string()),
            ("limit", limit.to_string()),
        ];

        let rows: Vec<Vec<Value>> = self
            .get_json("/spot/candlesticks", &query, Some(symbol))
            .await?;

        let candles = rows
            .iter()
            .map(|row| parse_candlestick(row))
            .collect::<Result<Vec<_>, _>>()?;

        Series::new(candles).map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn candlestick_columns_are_reordered() {
        let row: Vec<Value> = [
            "1700006400", "3550000", "35500", "36000", "34000", "35000", "100", "true",
        ]
        .iter()
        .map(|s| json!(s))
        .collect();
        let candle = parse_candlestick(&row).unwrap();
        assert_eq!(candle.timestamp.timestamp(), 1_700_006_400);
        assert_eq!(candle.open, 35000.0);
        assert_eq!(candle.high, 36000.0);
        assert_eq!(candle.low, 34000.0);
        assert_eq!(candle.close, 35500.0);
        assert_eq!(candle.volume, 100.0);
    }

    #[test]
    fn short_rows_derive_base_volume() {
        let row: Vec<Value> = ["1700006400", "3550000", "35500", "36000", "34000", "35000"]
            .iter()
            .map(|s| json!(s))
            .collect();
        assert_eq!(parse_candlestick(&row).unwrap().volume, 100.0);
    }
}
