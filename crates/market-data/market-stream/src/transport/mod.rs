//! Real-time transport capability
//!
//! A channel only needs to open a connection for a topic, push text frames, answer
//! pings and read inbound frames. Keeping that behind a trait lets the channel
//! logic run against an in-memory fake in tests.

pub mod websocket;

pub use websocket::WsTransport;

use crate::errors::Result;
use async_trait::async_trait;

/// Inbound frame, reduced to what a channel reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// UTF-8 payload, expected to hold JSON
    Text(String),
    /// Transport-level ping that must be answered with a pong
    Ping(Vec<u8>),
    /// Peer closed the connection, with its close code when one was sent
    Close(Option<u16>),
}

/// Write half of an open connection
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    async fn send_pong(&mut self, payload: Vec<u8>) -> Result<()>;

    /// Start a graceful close handshake
    async fn close(&mut self) -> Result<()>;
}

/// Read half of an open connection
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the connection is gone
    ///
    /// Must be cancel safe: a channel polls it inside `tokio::select!` next to its
    /// heartbeat timer and stop signal.
    async fn next_frame(&mut self) -> Option<Result<InboundFrame>>;
}

/// An open connection split into independently usable halves
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

impl Connection {
    pub fn new(sink: impl FrameSink + 'static, source: impl FrameSource + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            source: Box::new(source),
        }
    }
}

/// Opens connections bound to a single topic
#[async_trait]
pub trait Transport: Send + Sync {
    /// # Errors
    ///
    /// Returns [`crate::StreamError::ConnectionFailed`] when the connection cannot
    /// be established.
    async fn connect(&self, topic: &str) -> Result<Connection>;
}
