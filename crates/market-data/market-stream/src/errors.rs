//! Error types for the streaming client

use thiserror::Error;

/// Errors surfaced by the streaming client and the REST bootstrap loader
///
/// Nothing in here is fatal to the process. Transport variants are routed to the
/// reconnection supervisor, REST variants are handed back to whoever asked for the
/// bootstrap data.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Opening a transport connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An established connection failed while sending or receiving
    #[error("Transport error: {0}")]
    Transport(String),

    /// A frame or response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// REST endpoint answered with a non-success status
    #[error("HTTP {status} from {endpoint}")]
    Http {
        /// Status code returned by the server
        status: u16,
        /// Endpoint path that was requested
        endpoint: String,
    },

    /// REST request could not be completed
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `start()` called on a session that is already running
    #[error("Session already running")]
    AlreadyRunning,

    /// The session event loop is no longer running
    #[error("Session closed")]
    SessionClosed,
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<url::ParseError> for StreamError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, StreamError>;
