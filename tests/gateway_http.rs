mod common;

use common::*;
use dip_screener::gateway::GatewayOptions;
use dip_screener::scanner::{ScanSettings, SkipReason};
use dip_screener::{
    BinanceGateway, GateioGateway, GatewayError, MarketDataGateway, Scanner, Symbol, Timeframe,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn options(server: &MockServer) -> GatewayOptions {
    GatewayOptions {
        base_url: Some(server.uri()),
        ..GatewayOptions::default()
    }
}

fn binance_symbol(base: &str, quote: &str, status: &str, spot: bool) -> serde_json::Value {
    json!({
        "symbol": format!("{base}{quote}"),
        "status": status,
        "baseAsset": base,
        "quoteAsset": quote,
        "isSpotTradingAllowed": spot,
        "permissions": []
    })
}

async fn mount_exchange_info(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v3/exchangeInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "timezone": "UTC",
            "rateLimits": [
                {"rateLimitType": "REQUEST_WEIGHT", "interval": "MINUTE", "intervalNum": 1, "limit": 6000}
            ],
            "symbols": [
                binance_symbol("BTC", "USDT", "TRADING", true),
                binance_symbol("ETH", "BTC", "TRADING", true),
                binance_symbol("OLD", "USDT", "BREAK", true),
                binance_symbol("LEV", "USDT", "TRADING", false),
                binance_symbol("AAA", "USDT", "TRADING", true),
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn binance_universe_keeps_trading_usdt_spot_pairs() {
    let server = MockServer::start().await;
    mount_exchange_info(&server).await;

    let gateway = BinanceGateway::new(&options(&server)).unwrap();
    let symbols = gateway.list_usdt_spot_symbols().await.unwrap();

    assert_eq!(
        symbols,
        vec![Symbol::new("AAA", "USDT"), Symbol::new("BTC", "USDT")]
    );
}

#[tokio::test]
async fn binance_klines_request_covers_warm_up_history() {
    let server = MockServer::start().await;
    let series = dip_series();
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("interval", "1d"))
        .and(query_param("limit", "290"))
        .respond_with(ResponseTemplate::new(200).set_body_json(binance_klines(&series)))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = BinanceGateway::new(&options(&server)).unwrap();
    let fetched = gateway
        .fetch_series(&Symbol::new("BTC", "USDT"), Timeframe::OneDay, 90)
        .await
        .unwrap();

    assert_eq!(fetched, series);
}

#[tokio::test]
async fn binance_unknown_symbol_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"code": -1121, "msg": "Invalid symbol."})),
        )
        .mount(&server)
        .await;

    let gateway = BinanceGateway::new(&options(&server)).unwrap();
    let err = gateway
        .fetch_series(&Symbol::new("GONE", "USDT"), Timeframe::OneDay, 90)
        .await
        .unwrap_err();

    assert_eq!(err, GatewayError::UnknownSymbol(Symbol::new("GONE", "USDT")));
}

#[tokio::test]
async fn binance_rate_limit_reports_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "1")
                .set_body_json(json!({"code": -1003, "msg": "Too many requests."})),
        )
        .mount(&server)
        .await;

    let gateway = BinanceGateway::new(&options(&server)).unwrap();
    let err = gateway
        .fetch_series(&Symbol::new("BTC", "USDT"), Timeframe::OneDay, 90)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        GatewayError::RateLimited {
            retry_after: Some(Duration::from_secs(1))
        }
    );
}

#[tokio::test]
async fn binance_ban_is_reported_with_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(418).set_body_json(json!({
            "code": -1003,
            "msg": "Way too many requests; IP banned until 1000."
        })))
        .mount(&server)
        .await;

    let gateway = BinanceGateway::new(&options(&server)).unwrap();
    let err = gateway
        .fetch_series(&Symbol::new("BTC", "USDT"), Timeframe::OneDay, 90)
        .await
        .unwrap_err();

    match err {
        GatewayError::Banned { until } => assert_eq!(until.timestamp_millis(), 1000),
        other => panic!("expected a ban, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let gateway = BinanceGateway::new(&GatewayOptions {
        request_timeout: Duration::from_millis(50),
        ..options(&server)
    })
    .unwrap();
    let err = gateway
        .fetch_series(&Symbol::new("BTC", "USDT"), Timeframe::OneDay, 90)
        .await
        .unwrap_err();

    assert_eq!(err, GatewayError::Timeout);
}

#[tokio::test]
async fn malformed_rows_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([[1, "abc"]])))
        .mount(&server)
        .await;

    let gateway = BinanceGateway::new(&options(&server)).unwrap();
    let err = gateway
        .fetch_series(&Symbol::new("BTC", "USDT"), Timeframe::OneDay, 90)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Malformed(_)));
}

#[tokio::test]
async fn binance_scan_isolates_delisted_symbol() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/exchangeInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "symbols": [
                binance_symbol("AAA", "USDT", "TRADING", true),
                binance_symbol("BBB", "USDT", "TRADING", true),
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("symbol", "AAAUSDT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(binance_klines(&dip_series())))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("symbol", "BBBUSDT"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"code": -1121, "msg": "Invalid symbol."})),
        )
        .mount(&server)
        .await;

    let gateway = BinanceGateway::new(&options(&server)).unwrap();
    let scanner = Scanner::new(Arc::new(gateway), ScanSettings::default());
    let report = scanner.run(&strict_filters()).await.unwrap();

    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].symbol, Symbol::new("AAA", "USDT"));
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(
        report.skipped[0].reason,
        SkipReason::Fetch(GatewayError::UnknownSymbol(Symbol::new("BBB", "USDT")))
    );
}

#[tokio::test]
async fn gateio_universe_and_candles() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/spot/currency_pairs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "ETH_USDT", "base": "ETH", "quote": "USDT", "trade_status": "tradable"},
            {"id": "BTC_USDT", "base": "BTC", "quote": "USDT", "trade_status": "tradable"},
            {"id": "OLD_USDT", "base": "OLD", "quote": "USDT", "trade_status": "untradable"},
            {"id": "ETH_BTC", "base": "ETH", "quote": "BTC", "trade_status": "tradable"}
        ])))
        .mount(&server)
        .await;
    let series = rebound_series();
    Mock::given(method("GET"))
        .and(path("/spot/candlesticks"))
        .and(query_param("currency_pair", "ETH_USDT"))
        .and(query_param("interval", "1d"))
        .and(query_param("limit", "290"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gateio_candlesticks(&series)))
        .mount(&server)
        .await;

    let gateway = GateioGateway::new(&options(&server)).unwrap();
    let symbols = gateway.list_usdt_spot_symbols().await.unwrap();
    assert_eq!(
        symbols,
        vec![Symbol::new("BTC", "USDT"), Symbol::new("ETH", "USDT")]
    );

    let fetched = gateway
        .fetch_series(&symbols[1], Timeframe::OneDay, 90)
        .await
        .unwrap();
    assert_eq!(fetched.closes(), series.closes());
    assert_eq!(fetched.volumes(), series.volumes());
}

#[tokio::test]
async fn gateio_unknown_pair_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/spot/candlesticks"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "label": "INVALID_CURRENCY_PAIR",
            "message": "Invalid currency pair GONE_USDT"
        })))
        .mount(&server)
        .await;

    let gateway = GateioGateway::new(&options(&server)).unwrap();
    let err = gateway
        .fetch_series(&Symbol::new("GONE", "USDT"), Timeframe::OneDay, 90)
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::UnknownSymbol(Symbol::new("GONE", "USDT")));
}
