//! REST bootstrap loader
//!
//! One-shot reads that seed the market view before the stream takes over, and
//! that refresh it after a channel reconnects. Every call is idempotent and is
//! never retried here; failures are logged and handed back to the caller.

use crate::config::StreamConfig;
use crate::errors::{Result, StreamError};
use crate::models::{Candle, OrderBookSnapshot, Ticker, Trade};
use crate::orderbook::OrderBookReconstructor;
use crate::wire::{parse_level, sanitize_candle, sanitize_ticker, sanitize_trade};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

/// Source of bootstrap snapshots
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// 24h ticker; `Ok(None)` when the venue reports no usable price
    async fn fetch_ticker(&self, symbol: &str) -> Result<Option<Ticker>>;

    /// Book snapshot, sorted and truncated to `depth` per side
    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBookSnapshot>;

    /// Most recent trades, oldest first
    async fn fetch_trades(&self, symbol: &str, limit: u16) -> Result<Vec<Trade>>;

    /// Most recent candles, oldest first; the last one may still be in progress
    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: u16) -> Result<Vec<Candle>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerResponse {
    #[serde(default)]
    last_price: Value,
    #[serde(default)]
    price_change_percent: Value,
    #[serde(default)]
    high_price: Value,
    #[serde(default)]
    low_price: Value,
    #[serde(default)]
    volume: Value,
}

#[derive(Debug, Deserialize)]
struct DepthResponse {
    #[serde(default)]
    bids: Vec<Vec<Value>>,
    #[serde(default)]
    asks: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct TradeResponse {
    #[serde(default)]
    price: Value,
    #[serde(default)]
    qty: Value,
    time: Option<i64>,
    #[serde(rename = "isBuyerMaker", default)]
    is_buyer_maker: bool,
}

/// Binance USD-M futures public REST client
#[derive(Debug, Clone)]
pub struct BinanceRestClient {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceRestClient {
    /// # Errors
    ///
    /// Returns [`StreamError::Request`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// # Errors
    ///
    /// Returns [`StreamError::Request`] if the HTTP client cannot be built.
    pub fn from_config(config: &StreamConfig) -> Result<Self> {
        Self::new(config.rest_base_url.clone())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.request(endpoint, query)
            .await
            .inspect_err(|e| error!("REST {} failed: {}", endpoint, e))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), endpoint);
        debug!("GET {} {:?}", url, query);

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Http {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl MarketDataSource for BinanceRestClient {
    async fn fetch_ticker(&self, symbol: &str) -> Result<Option<Ticker>> {
        let raw: TickerResponse = self
            .get("/ticker/24hr", &[("symbol", symbol.to_uppercase())])
            .await?;
        Ok(sanitize_ticker(
            &raw.last_price,
            &raw.price_change_percent,
            &raw.high_price,
            &raw.low_price,
            &raw.volume,
        ))
    }

    async fn fetch_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBookSnapshot> {
        let raw: DepthResponse = self
            .get(
                "/depth",
                &[("symbol", symbol.to_uppercase()), ("limit", depth.to_string())],
            )
            .await?;

        let snapshot = OrderBookSnapshot {
            bids: raw.bids.iter().filter_map(|l| parse_level(l)).collect(),
            asks: raw.asks.iter().filter_map(|l| parse_level(l)).collect(),
        };
        // normalise through the reconstructor: sorted, unique, live, truncated
        let mut book = OrderBookReconstructor::new(depth);
        book.apply_snapshot(&snapshot);
        Ok(book.snapshot())
    }

    async fn fetch_trades(&self, symbol: &str, limit: u16) -> Result<Vec<Trade>> {
        let raw: Vec<TradeResponse> = self
            .get(
                "/trades",
                &[("symbol", symbol.to_uppercase()), ("limit", limit.to_string())],
            )
            .await?;

        Ok(raw
            .iter()
            .filter_map(|t| sanitize_trade(&t.price, &t.qty, t.is_buyer_maker, t.time))
            .collect())
    }

    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: u16) -> Result<Vec<Candle>> {
        let raw: Vec<Vec<Value>> = self
            .get(
                "/klines",
                &[
                    ("symbol", symbol.to_uppercase()),
                    ("interval", interval.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        Ok(raw.iter().filter_map(|row| candle_from_row(row)).collect())
    }
}

/// `[openTime, open, high, low, close, volume, closeTime, ...]`
fn candle_from_row(row: &[Value]) -> Option<Candle> {
    static MISSING: Value = Value::Null;
    let open_time = row.first()?.as_i64()?;
    let field = |i: usize| row.get(i).unwrap_or(&MISSING);
    sanitize_candle(open_time, field(1), field(2), field(3), field(4), field(5))
}
