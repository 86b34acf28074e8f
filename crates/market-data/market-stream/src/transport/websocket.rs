//! Websocket transport on tokio-tungstenite

use super::{Connection, FrameSink, FrameSource, InboundFrame, Transport};
use crate::errors::{Result, StreamError};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Raw-stream websocket transport: one socket per topic at `{base}/ws/{topic}`
#[derive(Debug, Clone)]
pub struct WsTransport {
    base_url: String,
}

impl WsTransport {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Full connection address for a topic
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidConfig`] when the result is not a valid URL.
    pub fn endpoint(&self, topic: &str) -> Result<Url> {
        let raw = format!("{}/ws/{}", self.base_url.trim_end_matches('/'), topic);
        Ok(Url::parse(&raw)?)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, topic: &str) -> Result<Connection> {
        let url = self.endpoint(topic)?;
        debug!("Connecting to {}", url);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| StreamError::ConnectionFailed(format!("{url}: {e}")))?;
        let (write, read) = ws_stream.split();

        Ok(Connection::new(WsSink { write }, WsSource { read }))
    }
}

struct WsSink {
    write: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.write.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn send_pong(&mut self, payload: Vec<u8>) -> Result<()> {
        self.write.send(Message::Pong(payload)).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}

struct WsSource {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame>> {
        loop {
            let frame = match self.read.next().await? {
                Ok(Message::Text(text)) => InboundFrame::Text(text),
                Ok(Message::Ping(data)) => InboundFrame::Ping(data),
                Ok(Message::Close(frame)) => InboundFrame::Close(frame.map(|f| u16::from(f.code))),
                Ok(other) => {
                    trace!("Ignoring non-text frame ({} bytes)", other.len());
                    continue;
                }
                Err(e) => return Some(Err(e.into())),
            };
            return Some(Ok(frame));
        }
    }
}
