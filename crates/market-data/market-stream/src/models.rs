//! Domain types published to subscribers

use serde::{Deserialize, Serialize};
use std::fmt;

/// 24h rolling ticker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    /// Last traded price, always positive once published
    pub price: f64,
    /// 24h change in percent
    pub change_percent: f64,
    /// 24h high
    pub high: f64,
    /// 24h low
    pub low: f64,
    /// 24h base volume
    pub volume: f64,
}

/// One price level of the order book
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

impl PriceLevel {
    #[must_use]
    pub const fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }
}

impl From<(f64, f64)> for PriceLevel {
    fn from((price, quantity): (f64, f64)) -> Self {
        Self { price, quantity }
    }
}

/// Depth-limited view of both book sides
///
/// Bids are sorted descending, asks ascending. Prices are unique per side and
/// every quantity is positive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl OrderBookSnapshot {
    /// True when neither side holds a level
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    #[must_use]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    #[must_use]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }
}

/// Aggressor side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Binance reports whether the buyer was the maker; the taker is then the seller
    #[must_use]
    pub const fn from_buyer_maker(is_buyer_maker: bool) -> Self {
        if is_buyer_maker { Self::Sell } else { Self::Buy }
    }
}

/// A single executed trade
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    /// Trade time in milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start in seconds since the Unix epoch
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// The four real-time channels of a market session
///
/// Each kind has a fixed slot in the session's channel table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Ticker,
    OrderBook,
    Trades,
    Candles,
}

impl ChannelKind {
    /// Every channel, in slot order
    pub const ALL: [Self; 4] = [Self::Ticker, Self::OrderBook, Self::Trades, Self::Candles];

    /// Slot in the session channel table
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Ticker => 0,
            Self::OrderBook => 1,
            Self::Trades => 2,
            Self::Candles => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::OrderBook => "orderbook",
            Self::Trades => "trades",
            Self::Candles => "candles",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
