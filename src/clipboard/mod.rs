//! Clipboard access port for the bridge
//!
//! The sync engine only talks to the local clipboard through the
//! [`ClipboardProvider`] trait. Platform access lives in [`system`], an
//! in-process clipboard lives in [`memory`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod codec;
pub mod memory;
pub mod system;

pub use codec::{decode, encode, DecodeError};
pub use memory::MemoryClipboard;
pub use system::SystemClipboard;

/// Free-form metadata attached to an entry (`format`, `size`, `mode`, ...)
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Image format assumed when an entry carries no `format` metadata
pub const DEFAULT_IMAGE_FORMAT: &str = "PNG";

/// Kind tag carried on the wire as `data_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardKind {
    Text,
    Image,
}

impl fmt::Display for ClipboardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipboardKind::Text => write!(f, "text"),
            ClipboardKind::Image => write!(f, "image"),
        }
    }
}

/// Clipboard payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardData {
    /// Unicode text
    Text(String),
    /// Encoded image bytes, in the format named by the `format` metadata
    Image(Vec<u8>),
}

/// A single clipboard value as seen by one side of the bridge
#[derive(Debug, Clone, PartialEq)]
pub struct ClipboardEntry {
    pub data: ClipboardData,
    pub metadata: Metadata,
}

impl ClipboardEntry {
    /// Create a text entry without metadata
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            data: ClipboardData::Text(text.into()),
            metadata: Metadata::new(),
        }
    }

    /// Create an image entry from already encoded bytes
    pub fn image(bytes: Vec<u8>, metadata: Metadata) -> Self {
        Self {
            data: ClipboardData::Image(bytes),
            metadata,
        }
    }

    pub fn kind(&self) -> ClipboardKind {
        match self.data {
            ClipboardData::Text(_) => ClipboardKind::Text,
            ClipboardData::Image(_) => ClipboardKind::Image,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            ClipboardData::Text(text) => Some(text),
            ClipboardData::Image(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.data {
            ClipboardData::Text(text) => text.is_empty(),
            ClipboardData::Image(bytes) => bytes.is_empty(),
        }
    }

    /// Image format from metadata, falling back to PNG
    pub fn image_format(&self) -> &str {
        self.metadata
            .get("format")
            .and_then(|value| value.as_str())
            .unwrap_or(DEFAULT_IMAGE_FORMAT)
    }

    /// Short human readable description used in log lines
    pub fn preview(&self) -> String {
        match &self.data {
            ClipboardData::Text(text) => {
                let head: String = text.chars().take(50).collect();
                if head.len() < text.len() {
                    format!("text: {}...", head)
                } else {
                    format!("text: {}", head)
                }
            }
            ClipboardData::Image(bytes) => match self.metadata.get("size") {
                Some(size) => format!("image: {}", size),
                None => format!("image: {} bytes", bytes.len()),
            },
        }
    }
}

/// Clipboard access errors
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// No clipboard mechanism exists in this environment
    #[error("No clipboard mechanism available: {0}")]
    Unavailable(String),

    /// Clipboard exists but the operation failed this time
    #[error("Platform error: {0}")]
    Platform(String),

    /// Clipboard holds a format the bridge cannot carry
    #[error("Unsupported content type: {0}")]
    UnsupportedType(String),

    /// Image bytes could not be converted
    #[error("Image conversion failed: {0}")]
    Image(String),
}

impl ClipboardError {
    /// True when retrying is pointless for the lifetime of the process
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ClipboardError::Unavailable(_))
    }
}

/// Clipboard access port
///
/// `read` returns `Ok(None)` for an empty clipboard.
#[async_trait]
pub trait ClipboardProvider: Send + Sync {
    /// Get current clipboard content
    async fn read(&self) -> Result<Option<ClipboardEntry>, ClipboardError>;

    /// Replace clipboard content
    async fn write(&self, entry: &ClipboardEntry) -> Result<(), ClipboardError>;

    /// Get provider name
    fn name(&self) -> &str;
}

/// Clipboard backend selected in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Native clipboard through arboard
    #[default]
    System,
    /// Process-local clipboard, for headless hosts
    Memory,
}

/// Create a clipboard provider for the configured backend
///
/// A system clipboard that cannot be opened is still returned; it reports
/// [`ClipboardError::Unavailable`] on use so only the detectors stop.
pub fn create_provider(backend: Backend) -> Box<dyn ClipboardProvider> {
    match backend {
        Backend::System => Box::new(SystemClipboard::new()),
        Backend::Memory => Box::new(MemoryClipboard::new()),
    }
}
