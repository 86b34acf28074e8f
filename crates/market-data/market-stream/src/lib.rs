//! Live single-market view for Binance USD-M futures
//!
//! Organized structure:
//! - rest: REST bootstrap loader
//! - transport/: websocket capability and its tokio-tungstenite implementation
//! - channel, reconnect: per-channel connection lifecycle and retry policy
//! - orderbook, sanitize, wire: frame validation and book reconstruction
//! - session: the four channels behind one subscribe/start/stop surface
//! - state: consumer-side market state fed by a session

#![deny(clippy::all)]

pub mod channel;
pub mod config;
pub mod errors;
pub mod models;
pub mod orderbook;
pub mod reconnect;
pub mod rest;
pub mod sanitize;
pub mod session;
pub mod state;
pub mod subscribers;
pub mod transport;
pub mod wire;

pub use config::StreamConfig;
pub use errors::{Result, StreamError};
pub use models::{Candle, ChannelKind, OrderBookSnapshot, PriceLevel, Side, Ticker, Trade};
pub use orderbook::{DepthDiff, OrderBookReconstructor};
pub use reconnect::{BackoffPolicy, ReconnectSupervisor, RetryPlan};
pub use rest::{BinanceRestClient, MarketDataSource};
pub use session::{SessionEvent, SessionHandle, StreamSession};
pub use state::{MarketState, MarketView};
pub use transport::{Connection, FrameSink, FrameSource, InboundFrame, Transport, WsTransport};
