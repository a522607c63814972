//! Wire protocol for the clipboard bridge
//!
//! Every application message is a single UTF-8 text frame. Control messages
//! are bare keywords, payload messages carry an encoded entry after a prefix.

use std::fmt;

pub const PING: &str = "ping";
pub const PONG: &str = "pong";
pub const GET_CLIPBOARD: &str = "get_clipboard";
pub const NEW_CLIPBOARD: &str = "new_clipboard";
pub const CLIPBOARD_CONTENT_PREFIX: &str = "clipboard_content:";
pub const CLIPBOARD_UPDATE_PREFIX: &str = "clipboard_update:";

/// A parsed wire message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Liveness probe
    Ping,
    /// Liveness reply
    Pong,
    /// Peer asks the relay for its current clipboard
    GetClipboard,
    /// Relay tells peers that its clipboard changed
    NewClipboard,
    /// Relay answers a pull; empty when the relay clipboard is empty
    ClipboardContent(String),
    /// Either side pushes a changed value
    ClipboardUpdate(String),
    /// Anything else, kept verbatim
    Other(String),
}

impl Message {
    /// Classify an incoming frame
    ///
    /// Keywords match exactly, payload messages by prefix. Parsing never fails.
    pub fn parse(text: &str) -> Self {
        match text {
            PING => Message::Ping,
            PONG => Message::Pong,
            GET_CLIPBOARD => Message::GetClipboard,
            NEW_CLIPBOARD => Message::NewClipboard,
            _ => {
                if let Some(rest) = text.strip_prefix(CLIPBOARD_CONTENT_PREFIX) {
                    Message::ClipboardContent(rest.to_string())
                } else if let Some(rest) = text.strip_prefix(CLIPBOARD_UPDATE_PREFIX) {
                    Message::ClipboardUpdate(rest.to_string())
                } else {
                    Message::Other(text.to_string())
                }
            }
        }
    }

    /// Short label for logs, without the payload
    pub fn label(&self) -> &'static str {
        match self {
            Message::Ping => PING,
            Message::Pong => PONG,
            Message::GetClipboard => GET_CLIPBOARD,
            Message::NewClipboard => NEW_CLIPBOARD,
            Message::ClipboardContent(_) => "clipboard_content",
            Message::ClipboardUpdate(_) => "clipboard_update",
            Message::Other(_) => "other",
        }
    }

    /// True for free text that the relay must not treat as clipboard content
    pub fn is_liveness_noise(&self) -> bool {
        match self {
            Message::Ping | Message::Pong => true,
            Message::Other(text) => text.starts_with(PING) || text.starts_with(PONG),
            _ => false,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Ping => f.write_str(PING),
            Message::Pong => f.write_str(PONG),
            Message::GetClipboard => f.write_str(GET_CLIPBOARD),
            Message::NewClipboard => f.write_str(NEW_CLIPBOARD),
            Message::ClipboardContent(payload) => {
                write!(f, "{}{}", CLIPBOARD_CONTENT_PREFIX, payload)
            }
            Message::ClipboardUpdate(payload) => {
                write!(f, "{}{}", CLIPBOARD_UPDATE_PREFIX, payload)
            }
            Message::Other(text) => f.write_str(text),
        }
    }
}
