//! Peer side of the bridge
//!
//! A [`PeerSession`] owns everything one peer process keeps across
//! connections: the LastSeen slot, the applier and the pending queue. Each
//! successful connection flushes the queue, then starts a detector and a
//! keepalive that live until the connection closes.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::keepalive::spawn_keepalive;
use super::{ChangeApplier, ChangeDetector, ChangeSink, LastSeen, PendingQueue, Role, SyncTiming};
use crate::clipboard::ClipboardProvider;
use crate::shutdown::{stopped, Shutdown};
use crate::transport::websocket::{self, WebSocketConfig};
use crate::transport::{Connection, ConnectionState, Message, TransportError};

/// The open connection and the switch that stops its background tasks
struct Link {
    connection: Arc<dyn Connection>,
    stop: watch::Sender<bool>,
}

pub struct PeerSession {
    provider: Arc<dyn ClipboardProvider>,
    last_seen: Arc<LastSeen>,
    applier: ChangeApplier,
    pending: PendingQueue,
    timing: SyncTiming,
    link: Mutex<Option<Link>>,
    state: Mutex<ConnectionState>,
}

impl PeerSession {
    pub fn new(provider: Arc<dyn ClipboardProvider>, timing: SyncTiming, pending_capacity: usize) -> Self {
        let last_seen = Arc::new(LastSeen::new());
        Self {
            applier: ChangeApplier::new(provider.clone(), last_seen.clone()),
            provider,
            last_seen,
            pending: PendingQueue::new(pending_capacity),
            timing,
            link: Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    fn set_state(&self, next: ConnectionState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection().is_some()
    }

    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    pub fn last_seen(&self) -> &LastSeen {
        &self.last_seen
    }

    fn connection(&self) -> Option<Arc<dyn Connection>> {
        self.link
            .lock()
            .ok()
            .and_then(|link| link.as_ref().map(|link| link.connection.clone()))
    }

    fn log_send_failure(error: &TransportError) {
        if error.is_disconnect() {
            debug!("Relay connection gone while sending: {}", error);
        } else {
            warn!("Error sending clipboard to relay: {}", error);
        }
    }

    /// Push a locally changed value to the relay
    ///
    /// Returns false when the value was queued instead of sent.
    pub async fn send_clipboard_update(&self, encoded: &str) -> bool {
        let Some(connection) = self.connection() else {
            debug!("Not connected to relay, queueing clipboard update");
            self.pending.enqueue(encoded.to_string());
            return false;
        };

        match connection
            .send(&Message::ClipboardUpdate(encoded.to_string()))
            .await
        {
            Ok(()) => {
                debug!("Sent clipboard update to relay");
                true
            }
            Err(e) => {
                Self::log_send_failure(&e);
                self.pending.enqueue(encoded.to_string());
                false
            }
        }
    }

    /// Handle one message from the relay
    pub async fn on_message(&self, text: &str) {
        match Message::parse(text) {
            Message::NewClipboard => {
                debug!("Relay clipboard changed, requesting content");
                if let Some(connection) = self.connection() {
                    if let Err(e) = connection.send(&Message::GetClipboard).await {
                        Self::log_send_failure(&e);
                    }
                }
            }
            Message::Ping => {
                if let Some(connection) = self.connection() {
                    if let Err(e) = connection.send(&Message::Pong).await {
                        Self::log_send_failure(&e);
                    }
                }
            }
            Message::ClipboardContent(payload) | Message::ClipboardUpdate(payload) => {
                self.applier.apply_incoming(&payload).await;
            }
            other => debug!("Ignoring {} message", other.label()),
        }
    }

    /// Send everything queued while disconnected, oldest first
    async fn flush_pending(&self, connection: &Arc<dyn Connection>) {
        let queued = self.pending.drain();
        if queued.is_empty() {
            return;
        }

        info!(pending = queued.len(), "Sending queued clipboard updates");
        for payload in queued {
            let message = Message::ClipboardUpdate(payload);
            if let Err(e) = connection.send(&message).await {
                Self::log_send_failure(&e);
                if let Message::ClipboardUpdate(payload) = message {
                    self.pending.enqueue(payload);
                }
            }
        }
    }

    /// Start syncing over a freshly opened connection
    pub async fn on_open(self: &Arc<Self>, connection: Arc<dyn Connection>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        if let Ok(mut link) = self.link.lock() {
            *link = Some(Link {
                connection: connection.clone(),
                stop: stop_tx,
            });
        }
        self.set_state(ConnectionState::Open);
        info!(connection = %connection.id(), "Connected to relay at {}", connection.remote());

        self.flush_pending(&connection).await;

        let detector = ChangeDetector::new(
            Role::Peer,
            self.provider.clone(),
            self.last_seen.clone(),
            self.timing.detector.clone(),
        );
        let session = self.clone();
        let detector_stop = stop_rx.clone();
        tokio::spawn(async move {
            let reason = detector.run(&*session, detector_stop).await;
            debug!("Peer clipboard monitoring ended: {}", reason);
        });

        spawn_keepalive(connection, self.timing.keepalive_interval, stop_rx);
    }

    /// Forget the current connection and stop its tasks
    pub fn on_close(&self, reason: &str) {
        let link = self.link.lock().ok().and_then(|mut link| link.take());
        if let Some(link) = link {
            link.stop.send_replace(true);
        }
        self.set_state(ConnectionState::Disconnected);
        info!("Connection to relay closed: {}", reason);
    }

    /// Connect to `url` and sync until the relay goes away or `shutdown` fires
    ///
    /// Reconnecting is left to the caller.
    pub async fn run(
        self: &Arc<Self>,
        url: &str,
        config: &WebSocketConfig,
        shutdown: &Shutdown,
    ) -> crate::Result<()> {
        self.set_state(ConnectionState::Connecting);
        info!("Connecting to relay at {}", url);
        let (connection, mut reader) = match websocket::connect(url, config).await {
            Ok(opened) => opened,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };
        reader.set_idle_timeout(self.timing.idle_timeout());
        let connection: Arc<dyn Connection> = connection;
        self.on_open(connection.clone()).await;

        let mut stop = shutdown.subscribe();
        let outcome = loop {
            tokio::select! {
                _ = stopped(&mut stop) => {
                    self.set_state(ConnectionState::Closing);
                    match tokio::time::timeout(self.timing.shutdown_grace, connection.close()).await {
                        Ok(Err(e)) => debug!("Error closing connection: {}", e),
                        Err(_) => debug!("Connection did not close within {:?}", self.timing.shutdown_grace),
                        Ok(Ok(())) => {}
                    }
                    break Ok("shutting down".to_string());
                }
                frame = reader.next_text() => match frame {
                    Some(Ok(text)) => self.on_message(&text).await,
                    Some(Err(e)) => break Err(e),
                    None => break Ok("closed by relay".to_string()),
                },
            }
        };

        match outcome {
            Ok(reason) => {
                self.on_close(&reason);
                Ok(())
            }
            Err(e) => {
                if e.is_disconnect() {
                    self.on_close(&e.to_string());
                } else {
                    warn!("WebSocket error: {}", e);
                    self.on_close("transport error");
                }
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl ChangeSink for PeerSession {
    async fn on_local_change(&self, encoded: String) {
        self.send_clipboard_update(&encoded).await;
    }
}
