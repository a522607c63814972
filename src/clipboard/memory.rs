//! Process-local clipboard
//!
//! Used on hosts without a desktop session and by the test suites.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{ClipboardEntry, ClipboardError, ClipboardProvider};

#[derive(Debug, Default)]
pub struct MemoryClipboard {
    content: Mutex<Option<ClipboardEntry>>,
    writes: Mutex<Vec<ClipboardEntry>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(entry: ClipboardEntry) -> Self {
        let clipboard = Self::new();
        clipboard.set(Some(entry));
        clipboard
    }

    /// Replace content as if a local user had copied something
    pub fn set(&self, entry: Option<ClipboardEntry>) {
        if let Ok(mut content) = self.content.lock() {
            *content = entry;
        }
    }

    /// Current content without going through the port
    pub fn current(&self) -> Option<ClipboardEntry> {
        self.content.lock().ok().and_then(|content| content.clone())
    }

    /// Every entry written through [`ClipboardProvider::write`], oldest first
    pub fn writes(&self) -> Vec<ClipboardEntry> {
        self.writes
            .lock()
            .map(|writes| writes.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ClipboardProvider for MemoryClipboard {
    async fn read(&self) -> Result<Option<ClipboardEntry>, ClipboardError> {
        let content = self
            .content
            .lock()
            .map_err(|_| ClipboardError::Platform("clipboard lock poisoned".to_string()))?;
        Ok(content.clone().filter(|entry| !entry.is_empty()))
    }

    async fn write(&self, entry: &ClipboardEntry) -> Result<(), ClipboardError> {
        let mut content = self
            .content
            .lock()
            .map_err(|_| ClipboardError::Platform("clipboard lock poisoned".to_string()))?;
        *content = Some(entry.clone());
        drop(content);

        if let Ok(mut writes) = self.writes.lock() {
            writes.push(entry.clone());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
