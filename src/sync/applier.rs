//! Change applier
//!
//! Writes values received from the other side into the local clipboard.
//! All writes on one side go through a single [`ChangeApplier`].

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::LastSeen;
use crate::clipboard::{codec, ClipboardEntry, ClipboardProvider};

/// What happened to an incoming value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The clipboard was written
    Written,
    /// Same value as the last one seen on this side
    Duplicate,
    /// Nothing to write
    Empty,
    /// The clipboard refused the write; the error was logged
    Failed,
}

pub struct ChangeApplier {
    provider: Arc<dyn ClipboardProvider>,
    last_seen: Arc<LastSeen>,
    write_lock: Mutex<()>,
}

impl ChangeApplier {
    pub fn new(provider: Arc<dyn ClipboardProvider>, last_seen: Arc<LastSeen>) -> Self {
        Self {
            provider,
            last_seen,
            write_lock: Mutex::new(()),
        }
    }

    /// Apply an encoded entry or legacy plain text
    ///
    /// Never fails: decode problems fall back to plain text and write errors
    /// are logged and reported as [`ApplyOutcome::Failed`].
    pub async fn apply_incoming(&self, payload: &str) -> ApplyOutcome {
        self.apply_entry(codec::decode_or_text(payload)).await
    }

    /// Write `entry` unless it is empty or already the last seen value
    pub async fn apply_entry(&self, entry: ClipboardEntry) -> ApplyOutcome {
        if entry.is_empty() {
            debug!("Ignoring empty clipboard value");
            return ApplyOutcome::Empty;
        }
        let canonical = codec::encode(&entry);

        let _guard = self.write_lock.lock().await;
        if self.last_seen.matches(&canonical) {
            debug!("Clipboard already holds {}", entry.preview());
            return ApplyOutcome::Duplicate;
        }

        match self.provider.write(&entry).await {
            Ok(()) => {
                self.last_seen.set(Some(canonical));
                info!("Clipboard updated: {}", entry.preview());
                ApplyOutcome::Written
            }
            Err(e) if e.is_unavailable() => {
                debug!("Cannot apply clipboard update: {}", e);
                ApplyOutcome::Failed
            }
            Err(e) => {
                warn!("Failed to set clipboard: {}", e);
                ApplyOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_support::{ScriptedClipboard, WriteMode};

    fn applier() -> (ChangeApplier, Arc<ScriptedClipboard>, Arc<LastSeen>) {
        let clipboard = ScriptedClipboard::new();
        let last_seen = Arc::new(LastSeen::new());
        let applier = ChangeApplier::new(clipboard.clone(), last_seen.clone());
        (applier, clipboard, last_seen)
    }

    #[tokio::test]
    async fn test_apply_twice_writes_once() {
        let (applier, clipboard, _) = applier();
        let payload = codec::encode(&ClipboardEntry::text("hello"));

        assert_eq!(applier.apply_incoming(&payload).await, ApplyOutcome::Written);
        assert_eq!(applier.apply_incoming(&payload).await, ApplyOutcome::Duplicate);
        assert_eq!(clipboard.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_plain_text_is_written_verbatim() {
        let (applier, clipboard, last_seen) = applier();

        assert_eq!(applier.apply_incoming("plain text").await, ApplyOutcome::Written);
        assert_eq!(clipboard.writes(), vec![ClipboardEntry::text("plain text")]);
        assert_eq!(
            last_seen.get(),
            Some(codec::encode(&ClipboardEntry::text("plain text")))
        );
    }

    #[tokio::test]
    async fn test_legacy_and_enveloped_forms_dedup_together() {
        let (applier, clipboard, _) = applier();

        applier.apply_incoming("same").await;
        let outcome = applier
            .apply_incoming(&codec::encode(&ClipboardEntry::text("same")))
            .await;

        assert_eq!(outcome, ApplyOutcome::Duplicate);
        assert_eq!(clipboard.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_payload_is_ignored() {
        let (applier, clipboard, _) = applier();

        assert_eq!(applier.apply_incoming("").await, ApplyOutcome::Empty);
        assert_eq!(
            applier
                .apply_incoming(r#"{"content":"","data_type":"text","metadata":{}}"#)
                .await,
            ApplyOutcome::Empty
        );
        assert!(clipboard.writes().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let (applier, clipboard, last_seen) = applier();
        clipboard.set_write_mode(WriteMode::Unavailable);
        assert_eq!(applier.apply_incoming("x").await, ApplyOutcome::Failed);

        clipboard.set_write_mode(WriteMode::Transient);
        assert_eq!(applier.apply_incoming("x").await, ApplyOutcome::Failed);
        assert_eq!(last_seen.get(), None);

        // A later attempt with the same value is not suppressed.
        clipboard.set_write_mode(WriteMode::Succeed);
        assert_eq!(applier.apply_incoming("x").await, ApplyOutcome::Written);
    }
}
