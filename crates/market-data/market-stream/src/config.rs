//! Session configuration

use crate::errors::{Result, StreamError};
use crate::models::ChannelKind;
use crate::reconnect::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default market
pub const DEFAULT_SYMBOL: &str = "BTCUSDT";
/// Binance USD-M futures websocket base
pub const DEFAULT_WS_BASE_URL: &str = "wss://fstream.binance.com";
/// Binance USD-M futures REST base
pub const DEFAULT_REST_BASE_URL: &str = "https://fapi.binance.com/fapi/v1";
/// Levels kept per book side
pub const DEFAULT_DEPTH: usize = 20;
/// Book depths offered by the partial depth stream
pub const STREAM_DEPTHS: [usize; 3] = [5, 10, 20];

/// Configuration for one market session
///
/// Everything has a sensible default; in practice only the symbol changes. There is
/// no configuration file, callers build this in code.
///
/// # Examples
/// ```
/// use market_stream::StreamConfig;
///
/// let config = StreamConfig::new("ethusdt").with_depth(10);
/// assert_eq!(config.symbol, "ETHUSDT");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Exchange symbol, upper case (e.g. BTCUSDT)
    pub symbol: String,
    /// Websocket base URL; channel topics are appended as `/ws/{topic}`
    pub ws_base_url: String,
    /// REST base URL for the bootstrap loader
    pub rest_base_url: String,
    /// Book depth per side, for both the stream topic and the reconstructor
    pub depth: usize,
    /// Candle interval (Binance notation, e.g. "1m")
    pub kline_interval: String,
    /// Liveness probe period
    pub heartbeat_interval_ms: u64,
    /// Period of the in-progress candle REST poll
    pub candle_poll_interval_ms: u64,
    /// Reconnection policy, applied to each channel independently
    pub backoff: BackoffPolicy,
    /// Trades requested during the initial bootstrap
    pub bootstrap_trade_limit: u16,
    /// Trades requested when the trade channel reconnects
    pub refresh_trade_limit: u16,
    /// Candles requested during the initial bootstrap
    pub bootstrap_candle_limit: u16,
    /// Capacity of the session event queue
    pub event_queue_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            symbol: DEFAULT_SYMBOL.to_string(),
            ws_base_url: DEFAULT_WS_BASE_URL.to_string(),
            rest_base_url: DEFAULT_REST_BASE_URL.to_string(),
            depth: DEFAULT_DEPTH,
            kline_interval: "1m".to_string(),
            heartbeat_interval_ms: 30_000,
            candle_poll_interval_ms: 60_000,
            backoff: BackoffPolicy::default(),
            bootstrap_trade_limit: 100,
            refresh_trade_limit: 50,
            bootstrap_candle_limit: 300,
            event_queue_capacity: 1024,
        }
    }
}

impl StreamConfig {
    /// Default configuration for `symbol`
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_ws_base_url(mut self, url: impl Into<String>) -> Self {
        self.ws_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_rest_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest_base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    #[must_use]
    pub fn with_kline_interval(mut self, interval: impl Into<String>) -> Self {
        self.kline_interval = interval.into();
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_candle_poll_interval(mut self, interval: Duration) -> Self {
        self.candle_poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Reject configurations the session cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() || !self.symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StreamError::InvalidConfig(format!(
                "symbol must be non-empty ASCII alphanumeric, got {:?}",
                self.symbol
            )));
        }
        if !STREAM_DEPTHS.contains(&self.depth) {
            return Err(StreamError::InvalidConfig(format!(
                "depth must be one of {:?}, got {}",
                STREAM_DEPTHS, self.depth
            )));
        }
        if self.kline_interval.is_empty() {
            return Err(StreamError::InvalidConfig("kline_interval is empty".to_string()));
        }
        if self.heartbeat_interval_ms == 0 || self.candle_poll_interval_ms == 0 {
            return Err(StreamError::InvalidConfig(
                "timer periods must be non-zero".to_string(),
            ));
        }
        if self.event_queue_capacity == 0 {
            return Err(StreamError::InvalidConfig(
                "event_queue_capacity must be non-zero".to_string(),
            ));
        }
        url::Url::parse(&self.ws_base_url)?;
        url::Url::parse(&self.rest_base_url)?;
        self.backoff.validate()
    }

    /// Lower-case symbol used in stream topics
    #[must_use]
    pub fn stream_symbol(&self) -> String {
        self.symbol.to_lowercase()
    }

    /// Topic name for a channel; it is baked into the connection address
    #[must_use]
    pub fn topic(&self, kind: ChannelKind) -> String {
        let sym = self.stream_symbol();
        match kind {
            ChannelKind::Ticker => format!("{sym}@ticker"),
            ChannelKind::OrderBook => format!("{sym}@depth{}@100ms", self.depth),
            ChannelKind::Trades => format!("{sym}@trade"),
            ChannelKind::Candles => format!("{sym}@kline_{}", self.kline_interval),
        }
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    #[must_use]
    pub fn candle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.candle_poll_interval_ms)
    }
}
