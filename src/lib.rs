//! # ClipBridge
//!
//! Clipboard synchronization bridge between a relay and its peers.
//!
//! The relay accepts WebSocket connections from peers, watches its own
//! clipboard and tells every peer when it changed. Peers watch theirs, push
//! changes to the relay and apply what it sends back.

pub mod cli;
pub mod clipboard;
pub mod config;
pub mod shutdown;
pub mod sync;
pub mod transport;

pub use config::Config;

/// Result type alias for ClipBridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ClipBridge operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Clipboard operation error
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] clipboard::ClipboardError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),
}

impl Error {
    /// True when the connection simply went away
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Error::Transport(e) if e.is_disconnect())
    }
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum clipboard payload size (5MB default)
pub const MAX_PAYLOAD_SIZE: usize = 5 * 1024 * 1024;
