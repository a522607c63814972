//! Test doubles for the sync engine

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::clipboard::{ClipboardEntry, ClipboardError, ClipboardProvider};
use crate::transport::{Connection, ConnectionId, Message, TransportError};

/// Connection that records what was sent through it
pub(crate) struct RecordingConnection {
    id: ConnectionId,
    sent: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    pings: AtomicUsize,
    failing: AtomicBool,
    closed: AtomicBool,
}

impl RecordingConnection {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        let connection = Self::new();
        connection.set_failing(true);
        connection
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn remote(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::WebSocket {
                message: "broken pipe".into(),
            });
        }
        self.sent.lock().unwrap().push(message.to_string());
        Ok(())
    }

    async fn ping(&self) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// How [`ScriptedClipboard::write`] behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    Succeed,
    Unavailable,
    Transient,
}

/// Clipboard whose reads follow a script, then fall back to its content
pub(crate) struct ScriptedClipboard {
    script: Mutex<VecDeque<Result<Option<ClipboardEntry>, ClipboardError>>>,
    content: Mutex<Option<ClipboardEntry>>,
    writes: Mutex<Vec<ClipboardEntry>>,
    write_mode: Mutex<WriteMode>,
    reads: AtomicUsize,
}

impl ScriptedClipboard {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            content: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            write_mode: Mutex::new(WriteMode::Succeed),
            reads: AtomicUsize::new(0),
        })
    }

    pub(crate) fn push_read(&self, result: Result<Option<ClipboardEntry>, ClipboardError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub(crate) fn set_content(&self, entry: Option<ClipboardEntry>) {
        *self.content.lock().unwrap() = entry;
    }

    pub(crate) fn set_write_mode(&self, mode: WriteMode) {
        *self.write_mode.lock().unwrap() = mode;
    }

    pub(crate) fn writes(&self) -> Vec<ClipboardEntry> {
        self.writes.lock().unwrap().clone()
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClipboardProvider for ScriptedClipboard {
    async fn read(&self) -> Result<Option<ClipboardEntry>, ClipboardError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(step) = self.script.lock().unwrap().pop_front() {
            return step;
        }
        Ok(self.content.lock().unwrap().clone())
    }

    async fn write(&self, entry: &ClipboardEntry) -> Result<(), ClipboardError> {
        match *self.write_mode.lock().unwrap() {
            WriteMode::Succeed => {}
            WriteMode::Unavailable => {
                return Err(ClipboardError::Unavailable("no clipboard".into()))
            }
            WriteMode::Transient => return Err(ClipboardError::Platform("busy".into())),
        }
        self.writes.lock().unwrap().push(entry.clone());
        *self.content.lock().unwrap() = Some(entry.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
