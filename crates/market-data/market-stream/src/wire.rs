//! Binance frame shapes and their conversion into domain types
//!
//! Numeric fields are kept as raw JSON values on the wire structs and only turned
//! into numbers through [`crate::sanitize`], which applies the per-field fallback
//! policy. A frame whose shape is wrong is a payload error (`Err`); a frame whose
//! shape is fine but whose load-bearing field is invalid is silently discarded
//! (`Ok(None)`).

use crate::errors::Result;
use crate::models::{Candle, PriceLevel, Side, Ticker, Trade};
use crate::orderbook::DepthDiff;
use crate::sanitize::{parse, positive, sanitize};
use serde::Deserialize;
use serde_json::Value;

/// 24hr rolling ticker event (`<symbol>@ticker`)
#[derive(Debug, Deserialize)]
pub struct TickerFrame {
    #[serde(rename = "c", default)]
    pub last_price: Value,
    #[serde(rename = "P", default)]
    pub change_percent: Value,
    #[serde(rename = "h", default)]
    pub high: Value,
    #[serde(rename = "l", default)]
    pub low: Value,
    #[serde(rename = "v", default)]
    pub volume: Value,
}

/// Depth event (`<symbol>@depth<N>@100ms`)
#[derive(Debug, Deserialize)]
pub struct DepthFrame {
    #[serde(rename = "u")]
    pub final_update_id: Option<u64>,
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: Option<u64>,
    #[serde(rename = "pu")]
    pub prev_update_id: Option<u64>,
    #[serde(rename = "b", default)]
    pub bids: Vec<Vec<Value>>,
    #[serde(rename = "a", default)]
    pub asks: Vec<Vec<Value>>,
}

/// Trade event (`<symbol>@trade`)
#[derive(Debug, Deserialize)]
pub struct TradeFrame {
    #[serde(rename = "p", default)]
    pub price: Value,
    #[serde(rename = "q", default)]
    pub quantity: Value,
    #[serde(rename = "m", default)]
    pub is_buyer_maker: bool,
    #[serde(rename = "T")]
    pub trade_time: Option<i64>,
}

/// Kline event (`<symbol>@kline_<interval>`)
#[derive(Debug, Deserialize)]
pub struct KlineFrame {
    #[serde(rename = "k")]
    pub kline: KlinePayload,
}

#[derive(Debug, Deserialize)]
pub struct KlinePayload {
    /// Bucket open time in milliseconds
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "o", default)]
    pub open: Value,
    #[serde(rename = "h", default)]
    pub high: Value,
    #[serde(rename = "l", default)]
    pub low: Value,
    #[serde(rename = "c", default)]
    pub close: Value,
    #[serde(rename = "v", default)]
    pub volume: Value,
    /// Whether the bar is closed
    #[serde(rename = "x", default)]
    pub is_closed: bool,
}

/// True for acknowledgements of our own liveness probes
///
/// The venue answers `{"method":"ping"}` with either `{"pong":...}` or
/// `{"result":null,"id":...}`; neither carries market data.
#[must_use]
pub fn is_heartbeat_ack(value: &Value) -> bool {
    value.get("pong").is_some() || value.get("result").is_some_and(Value::is_null)
}

/// Outbound liveness probe
#[must_use]
pub fn ping_probe(id: i64) -> String {
    serde_json::json!({ "method": "ping", "id": id }).to_string()
}

/// Build a ticker from raw fields, `None` when the price is unusable
#[must_use]
pub fn sanitize_ticker(
    price: &Value,
    change_percent: &Value,
    high: &Value,
    low: &Value,
    volume: &Value,
) -> Option<Ticker> {
    let price = positive(price)?;
    Some(Ticker {
        price,
        change_percent: sanitize(change_percent, 0.0),
        high: positive(high).unwrap_or(price),
        low: positive(low).unwrap_or(price),
        volume: sanitize(volume, 0.0),
    })
}

/// Build a trade from raw fields, `None` when price or quantity is unusable
#[must_use]
pub fn sanitize_trade(
    price: &Value,
    quantity: &Value,
    is_buyer_maker: bool,
    timestamp: Option<i64>,
) -> Option<Trade> {
    let price = positive(price)?;
    let quantity = positive(quantity)?;
    Some(Trade {
        side: Side::from_buyer_maker(is_buyer_maker),
        price,
        quantity,
        timestamp: timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
    })
}

/// Build a candle from raw fields, `None` when the close is unusable
#[must_use]
pub fn sanitize_candle(
    open_time_ms: i64,
    open: &Value,
    high: &Value,
    low: &Value,
    close: &Value,
    volume: &Value,
) -> Option<Candle> {
    let close = positive(close)?;
    Some(Candle {
        time: open_time_ms.div_euclid(1000),
        open: positive(open).unwrap_or(close),
        high: positive(high).unwrap_or(close),
        low: positive(low).unwrap_or(close),
        close,
        volume: sanitize(volume, 0.0),
    })
}

/// Parse a `[price, quantity]` pair; `None` when either side is not a number
#[must_use]
pub fn parse_level(raw: &[Value]) -> Option<PriceLevel> {
    let price = parse(raw.first()?)?;
    let quantity = parse(raw.get(1)?)?;
    Some(PriceLevel::new(price, quantity))
}

/// # Errors
///
/// Returns a decode error when the frame is not a ticker object.
pub fn decode_ticker(value: Value) -> Result<Option<Ticker>> {
    let frame: TickerFrame = serde_json::from_value(value)?;
    Ok(sanitize_ticker(
        &frame.last_price,
        &frame.change_percent,
        &frame.high,
        &frame.low,
        &frame.volume,
    ))
}

/// Decode a depth frame into a diff
///
/// Frames without any update id cannot be ordered and are discarded. Levels that
/// do not parse are skipped; zero quantities are kept since they mean removal.
///
/// # Errors
///
/// Returns a decode error when the frame is not a depth object.
pub fn decode_depth(value: Value) -> Result<Option<DepthDiff>> {
    let frame: DepthFrame = serde_json::from_value(value)?;
    let Some(update_id) = frame.final_update_id.or(frame.last_update_id) else {
        return Ok(None);
    };

    Ok(Some(DepthDiff {
        update_id,
        prev_update_id: frame.prev_update_id,
        bids: frame.bids.iter().filter_map(|l| parse_level(l)).collect(),
        asks: frame.asks.iter().filter_map(|l| parse_level(l)).collect(),
    }))
}

/// # Errors
///
/// Returns a decode error when the frame is not a trade object.
pub fn decode_trade(value: Value) -> Result<Option<Trade>> {
    let frame: TradeFrame = serde_json::from_value(value)?;
    Ok(sanitize_trade(
        &frame.price,
        &frame.quantity,
        frame.is_buyer_maker,
        frame.trade_time,
    ))
}

/// Decode a kline frame; only closed bars are published from the stream
///
/// # Errors
///
/// Returns a decode error when the frame is not a kline object.
pub fn decode_kline(value: Value) -> Result<Option<Candle>> {
    let KlineFrame { kline } = serde_json::from_value(value)?;
    if !kline.is_closed {
        return Ok(None);
    }
    Ok(sanitize_candle(
        kline.open_time,
        &kline.open,
        &kline.high,
        &kline.low,
        &kline.close,
        &kline.volume,
    ))
}
