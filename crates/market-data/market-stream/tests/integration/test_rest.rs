//! REST loader tests against a mock Binance endpoint

use market_stream::{
    BinanceRestClient, MarketDataSource, MarketView, PriceLevel, Side, StreamConfig, StreamError,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_json(server: &MockServer, endpoint: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_ticker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ticker/24hr"))
        .and(query_param("symbol", "BTCUSDT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "symbol": "BTCUSDT",
            "lastPrice": "68250.40",
            "priceChangePercent": "-1.250",
            "highPrice": "69100.00",
            "lowPrice": "0",
            "volume": "183402.118"
        })))
        .mount(&server)
        .await;

    let client = BinanceRestClient::new(server.uri()).unwrap();
    let ticker = client.fetch_ticker("btcusdt").await.unwrap().unwrap();

    assert_eq!(ticker.price, 68_250.4);
    assert_eq!(ticker.change_percent, -1.25);
    assert_eq!(ticker.high, 69_100.0);
    // zero low falls back to the last price
    assert_eq!(ticker.low, 68_250.4);
    assert_eq!(ticker.volume, 183_402.118);
}

#[tokio::test]
async fn test_fetch_ticker_without_price() {
    let server = MockServer::start().await;
    mount_json(&server, "/ticker/24hr", json!({"lastPrice": "NaN"})).await;

    let client = BinanceRestClient::new(server.uri()).unwrap();
    assert!(client.fetch_ticker("BTCUSDT").await.unwrap().is_none());
}

#[tokio::test]
async fn test_fetch_order_book_normalises_levels() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/depth"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lastUpdateId": 1027024,
            "bids": [["99.0", "2"], ["100.0", "1"], ["98.0", "0"], ["bad", "1"]],
            "asks": [["102.0", "3"], ["101.0", "1.5"]]
        })))
        .mount(&server)
        .await;

    let client = BinanceRestClient::new(server.uri()).unwrap();
    let book = client.fetch_order_book("BTCUSDT", 5).await.unwrap();

    assert_eq!(
        book.bids,
        vec![PriceLevel::new(100.0, 1.0), PriceLevel::new(99.0, 2.0)]
    );
    assert_eq!(
        book.asks,
        vec![PriceLevel::new(101.0, 1.5), PriceLevel::new(102.0, 3.0)]
    );
}

#[tokio::test]
async fn test_fetch_trades_maps_side_and_drops_invalid_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trades"))
        .and(query_param("limit", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "price": "100.1", "qty": "0.5", "time": 1000, "isBuyerMaker": true},
            {"id": 2, "price": "100.2", "qty": "0", "time": 1001, "isBuyerMaker": false},
            {"id": 3, "price": "100.3", "qty": "1.5", "time": 1002, "isBuyerMaker": false}
        ])))
        .mount(&server)
        .await;

    let client = BinanceRestClient::new(server.uri()).unwrap();
    let trades = client.fetch_trades("BTCUSDT", 100).await.unwrap();

    let summary: Vec<(Side, f64, i64)> = trades
        .iter()
        .map(|t| (t.side, t.price, t.timestamp))
        .collect();
    assert_eq!(summary, vec![(Side::Sell, 100.1, 1000), (Side::Buy, 100.3, 1002)]);
}

#[tokio::test]
async fn test_fetch_candles() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/klines"))
        .and(query_param("interval", "1m"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            [
                1_700_000_000_000_i64, "10", "12", "9", "11", "100",
                1_700_000_059_999_i64, "0", 5, "0", "0", "0"
            ],
            [
                1_700_000_060_000_i64, "11", "13", "10", "12.5", "80",
                1_700_000_119_999_i64, "0", 3, "0", "0", "0"
            ]
        ])))
        .mount(&server)
        .await;

    let client = BinanceRestClient::new(server.uri()).unwrap();
    let candles = client.fetch_candles("BTCUSDT", "1m", 2).await.unwrap();

    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0].time, 1_700_000_000);
    assert_eq!(candles[1].time, 1_700_000_060);
    assert_eq!(candles[1].close, 12.5);
}

#[tokio::test]
async fn test_non_success_status_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/depth"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = BinanceRestClient::new(server.uri()).unwrap();
    let err = client.fetch_order_book("BTCUSDT", 20).await.unwrap_err();

    match err {
        StreamError::Http { status, endpoint } => {
            assert_eq!(status, 429);
            assert_eq!(endpoint, "/depth");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_garbage_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/trades"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let client = BinanceRestClient::new(server.uri()).unwrap();
    let err = client.fetch_trades("BTCUSDT", 10).await.unwrap_err();
    assert!(matches!(err, StreamError::Decode(_)));
}

#[tokio::test]
async fn test_load_initial_is_all_or_nothing() {
    let server = MockServer::start().await;
    mount_json(&server, "/ticker/24hr", json!({"lastPrice": "100"})).await;
    mount_json(&server, "/depth", json!({"bids": [["99", "1"]], "asks": [["101", "1"]]})).await;
    mount_json(&server, "/trades", json!([])).await;
    Mock::given(method("GET"))
        .and(path("/klines"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = StreamConfig::new("BTCUSDT").with_rest_base_url(server.uri());
    let client = Arc::new(BinanceRestClient::from_config(&config).unwrap());
    let view = MarketView::new(config, client);

    let result = view.load_initial().await;
    assert!(matches!(result, Err(StreamError::Http { status: 500, .. })));
    assert!(view.snapshot().ticker().is_none());
    assert!(view.snapshot().order_book().is_empty());
}

#[tokio::test]
async fn test_load_initial_installs_everything() {
    let server = MockServer::start().await;
    mount_json(&server, "/ticker/24hr", json!({"lastPrice": "100", "volume": "5"})).await;
    mount_json(&server, "/depth", json!({"bids": [["99", "1"]], "asks": [["101", "1"]]})).await;
    mount_json(
        &server,
        "/trades",
        json!([
            {"price": "99.5", "qty": "1", "time": 1, "isBuyerMaker": false},
            {"price": "99.6", "qty": "1", "time": 2, "isBuyerMaker": true}
        ]),
    )
    .await;
    mount_json(
        &server,
        "/klines",
        json!([[60_000, "1", "1", "1", "1", "1"], [120_000, "2", "2", "2", "2", "2"]]),
    )
    .await;

    let config = StreamConfig::new("BTCUSDT").with_rest_base_url(server.uri());
    let client = Arc::new(BinanceRestClient::from_config(&config).unwrap());
    let view = MarketView::new(config, client);
    view.load_initial().await.unwrap();

    let state = view.snapshot();
    assert_eq!(state.ticker().map(|t| t.price), Some(100.0));
    assert_eq!(state.order_book().best_bid(), Some(PriceLevel::new(99.0, 1.0)));
    assert_eq!(state.trades().front().map(|t| t.timestamp), Some(2));
    assert_eq!(state.candles().iter().map(|c| c.time).collect::<Vec<_>>(), vec![60, 120]);
}
