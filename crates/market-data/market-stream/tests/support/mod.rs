//! In-memory doubles for the transport and the bootstrap loader

use async_trait::async_trait;
use market_stream::{
    Candle, Connection, FrameSink, FrameSource, InboundFrame, MarketDataSource, OrderBookSnapshot,
    PriceLevel, Result, Side, StreamError, Ticker, Trade, Transport,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Let every ready task run; with a paused clock this also fires due timers
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Something a channel wrote to its connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text(String),
    Pong(Vec<u8>),
    Close,
}

impl Sent {
    pub fn is_ping_probe(&self) -> bool {
        match self {
            Self::Text(text) => serde_json::from_str::<serde_json::Value>(text)
                .map(|v| v["method"] == "ping" && v["id"].is_i64())
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[derive(Default)]
struct TopicState {
    failures_left: usize,
    connects: Vec<Instant>,
    server: Option<mpsc::UnboundedSender<Result<InboundFrame>>>,
    sent: Arc<Mutex<Vec<Sent>>>,
}

/// Transport whose connections are driven by the test
#[derive(Default)]
pub struct FakeTransport {
    topics: Mutex<HashMap<String, TopicState>>,
    failing_sends: Arc<Mutex<bool>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `count` connects to `topic` fail
    pub fn fail_next(&self, topic: &str, count: usize) {
        self.topics.lock().entry(topic.to_string()).or_default().failures_left += count;
    }

    /// Make every send on every connection fail
    pub fn set_failing_sends(&self, failing: bool) {
        *self.failing_sends.lock() = failing;
    }

    /// Connect attempts made for `topic`, failed ones included
    pub fn connects(&self, topic: &str) -> usize {
        self.topics.lock().get(topic).map_or(0, |t| t.connects.len())
    }

    /// Gaps between consecutive connect attempts, in milliseconds
    pub fn connect_gaps_ms(&self, topic: &str) -> Vec<u64> {
        let topics = self.topics.lock();
        let Some(state) = topics.get(topic) else {
            return Vec::new();
        };
        state
            .connects
            .windows(2)
            .map(|w| u64::try_from((w[1] - w[0]).as_millis()).unwrap_or(u64::MAX))
            .collect()
    }

    /// Everything written on `topic`, across all its connections
    pub fn sent(&self, topic: &str) -> Vec<Sent> {
        self.topics
            .lock()
            .get(topic)
            .map(|t| t.sent.lock().clone())
            .unwrap_or_default()
    }

    /// True while the latest connection for `topic` is being read
    pub fn is_connected(&self, topic: &str) -> bool {
        self.topics
            .lock()
            .get(topic)
            .and_then(|t| t.server.as_ref())
            .is_some_and(|tx| !tx.is_closed())
    }

    fn deliver(&self, topic: &str, frame: Result<InboundFrame>) -> bool {
        self.topics
            .lock()
            .get(topic)
            .and_then(|t| t.server.as_ref())
            .is_some_and(|tx| tx.send(frame).is_ok())
    }

    pub fn push_text(&self, topic: &str, text: impl Into<String>) -> bool {
        self.deliver(topic, Ok(InboundFrame::Text(text.into())))
    }

    pub fn push_json(&self, topic: &str, value: serde_json::Value) -> bool {
        self.push_text(topic, value.to_string())
    }

    pub fn push_ping(&self, topic: &str, payload: Vec<u8>) -> bool {
        self.deliver(topic, Ok(InboundFrame::Ping(payload)))
    }

    /// Server-initiated close frame
    pub fn server_close(&self, topic: &str) -> bool {
        self.deliver(topic, Ok(InboundFrame::Close(Some(1000))))
    }

    pub fn push_error(&self, topic: &str) -> bool {
        self.deliver(topic, Err(StreamError::Transport("connection reset".to_string())))
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, topic: &str) -> Result<Connection> {
        let mut topics = self.topics.lock();
        let state = topics.entry(topic.to_string()).or_default();
        state.connects.push(Instant::now());

        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(StreamError::ConnectionFailed(format!("{topic}: refused")));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.server = Some(tx);
        let sink = FakeSink {
            sent: Arc::clone(&state.sent),
            failing: Arc::clone(&self.failing_sends),
        };
        Ok(Connection::new(sink, FakeSource { frames: rx }))
    }
}

struct FakeSink {
    sent: Arc<Mutex<Vec<Sent>>>,
    failing: Arc<Mutex<bool>>,
}

impl FakeSink {
    fn record(&self, sent: Sent) -> Result<()> {
        if *self.failing.lock() {
            return Err(StreamError::Transport("broken pipe".to_string()));
        }
        self.sent.lock().push(sent);
        Ok(())
    }
}

#[async_trait]
impl FrameSink for FakeSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.record(Sent::Text(text))
    }

    async fn send_pong(&mut self, payload: Vec<u8>) -> Result<()> {
        self.record(Sent::Pong(payload))
    }

    async fn close(&mut self) -> Result<()> {
        self.record(Sent::Close)
    }
}

struct FakeSource {
    frames: mpsc::UnboundedReceiver<Result<InboundFrame>>,
}

#[async_trait]
impl FrameSource for FakeSource {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame>> {
        self.frames.recv().await
    }
}

/// Canned bootstrap data with call recording
pub struct FakeLoader {
    pub ticker: Mutex<Option<Ticker>>,
    pub book: Mutex<OrderBookSnapshot>,
    pub trades: Mutex<Vec<Trade>>,
    pub candles: Mutex<Vec<Candle>>,
    pub failing: Mutex<bool>,
    pub trade_limits: Mutex<Vec<u16>>,
    pub candle_limits: Mutex<Vec<u16>>,
    pub book_fetches: Mutex<usize>,
}

impl Default for FakeLoader {
    fn default() -> Self {
        Self {
            ticker: Mutex::new(Some(ticker(68_000.0))),
            book: Mutex::new(OrderBookSnapshot {
                bids: vec![PriceLevel::new(100.0, 1.0), PriceLevel::new(99.0, 2.0)],
                asks: vec![PriceLevel::new(101.0, 1.0)],
            }),
            trades: Mutex::new(vec![trade(100.0, 1), trade(100.5, 2)]),
            candles: Mutex::new(vec![candle(60, 1.0), candle(120, 2.0)]),
            failing: Mutex::new(false),
            trade_limits: Mutex::new(Vec::new()),
            candle_limits: Mutex::new(Vec::new()),
            book_fetches: Mutex::new(0),
        }
    }
}

impl FakeLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn check(&self, endpoint: &str) -> Result<()> {
        if *self.failing.lock() {
            return Err(StreamError::Http {
                status: 503,
                endpoint: endpoint.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataSource for FakeLoader {
    async fn fetch_ticker(&self, _symbol: &str) -> Result<Option<Ticker>> {
        self.check("/ticker/24hr")?;
        Ok(*self.ticker.lock())
    }

    async fn fetch_order_book(&self, _symbol: &str, _depth: usize) -> Result<OrderBookSnapshot> {
        self.check("/depth")?;
        *self.book_fetches.lock() += 1;
        Ok(self.book.lock().clone())
    }

    async fn fetch_trades(&self, _symbol: &str, limit: u16) -> Result<Vec<Trade>> {
        self.check("/trades")?;
        self.trade_limits.lock().push(limit);
        Ok(self.trades.lock().clone())
    }

    async fn fetch_candles(
        &self,
        _symbol: &str,
        _interval: &str,
        limit: u16,
    ) -> Result<Vec<Candle>> {
        self.check("/klines")?;
        self.candle_limits.lock().push(limit);
        let candles = self.candles.lock();
        let skip = candles.len().saturating_sub(usize::from(limit));
        Ok(candles[skip..].to_vec())
    }
}

pub fn ticker(price: f64) -> Ticker {
    Ticker {
        price,
        change_percent: 1.5,
        high: price + 100.0,
        low: price - 100.0,
        volume: 1_000.0,
    }
}

pub fn trade(price: f64, timestamp: i64) -> Trade {
    Trade {
        side: Side::Buy,
        price,
        quantity: 0.5,
        timestamp,
    }
}

pub fn candle(time: i64, close: f64) -> Candle {
    Candle {
        time,
        open: close,
        high: close,
        low: close,
        close,
        volume: 10.0,
    }
}

/// Collects whatever a subscriber callback receives
#[derive(Clone)]
pub struct Recorder<T> {
    seen: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn callback(&self) -> impl Fn(&T) + Send + Sync + 'static {
        let seen = Arc::clone(&self.seen);
        move |value: &T| seen.lock().push(value.clone())
    }

    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.seen.lock())
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }
}
