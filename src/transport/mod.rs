//! Network transport for the clipboard bridge
//!
//! This module provides the WebSocket channel between the relay and its
//! peers, the text message grammar, and reconnection backoff.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod protocol;
pub mod reconnect;
pub mod websocket;

pub use protocol::Message;
pub use reconnect::ReconnectionConfig;
pub use websocket::{FrameReader, WebSocketConfig, WsConnection, WsListener};

/// Connection identifier type
pub type ConnectionId = Uuid;

/// Transport layer errors with user-friendly messages
#[derive(Debug, Error)]
pub enum TransportError {
    /// WebSocket protocol error
    #[error("CB001: Network connection error: {message}. Please check your network connection and try again.")]
    WebSocket { message: String },

    /// Connection error
    #[error("CB002: Connection failed: {message}. Check that the relay is running and reachable.")]
    Connection { message: String },

    /// IO error
    #[error("CB003: System error: {0}")]
    Io(#[from] std::io::Error),

    /// No connection is currently open
    #[error("CB004: Not connected to the relay.")]
    NotConnected,

    /// Connection closed
    #[error("CB005: Connection closed unexpectedly. The other side may have gone offline.")]
    ConnectionClosed,

    /// Timeout error
    #[error("CB006: Operation timed out. Check your network connection and try again.")]
    Timeout,

    /// Invalid endpoint
    #[error("CB007: Invalid address '{address}': {message}")]
    InvalidAddress { address: String, message: String },
}

impl TransportError {
    /// True when the failure only means there is no usable connection
    ///
    /// These are expected while disconnected and are logged quietly; any
    /// other error is a real connectivity problem.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            TransportError::NotConnected | TransportError::ConnectionClosed
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match error {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::ConnectionClosed,
            WsError::Io(e) => TransportError::Io(e),
            other => TransportError::WebSocket {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// An open channel to the other side
///
/// Shared between the receive loop, the detector and the keepalive task, so
/// every method takes `&self`.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Connection identifier
    fn id(&self) -> ConnectionId;

    /// Remote address for logs
    fn remote(&self) -> &str;

    /// Send one message as a single text frame
    async fn send(&self, message: &Message) -> Result<()>;

    /// Send a transport-level ping
    async fn ping(&self) -> Result<()>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection
    Disconnected,

    /// Connection is being established
    Connecting,

    /// Connection is active and ready
    Open,

    /// Connection is being closed
    Closing,
}
