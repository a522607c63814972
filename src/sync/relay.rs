//! Relay side of the bridge
//!
//! The relay accepts peer connections on the channel path, answers their
//! requests, applies their updates and tells every other peer when its own
//! clipboard changed.

use async_trait::async_trait;
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::keepalive::spawn_keepalive;
use super::{
    ApplyOutcome, ChangeApplier, ChangeDetector, ChangeSink, ConnectionRegistry, LastSeen, Role,
    SyncTiming,
};
use crate::clipboard::{codec, ClipboardEntry, ClipboardProvider};
use crate::shutdown::{stopped, Shutdown};
use crate::transport::websocket::{self, WebSocketConfig, WsListener};
use crate::transport::{Connection, ConnectionId, Message};

pub struct Relay {
    provider: Arc<dyn ClipboardProvider>,
    last_seen: Arc<LastSeen>,
    applier: ChangeApplier,
    registry: ConnectionRegistry,
    timing: SyncTiming,
}

impl Relay {
    pub fn new(provider: Arc<dyn ClipboardProvider>, timing: SyncTiming) -> Self {
        let last_seen = Arc::new(LastSeen::new());
        Self {
            applier: ChangeApplier::new(provider.clone(), last_seen.clone()),
            provider,
            last_seen,
            registry: ConnectionRegistry::new(),
            timing,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn last_seen(&self) -> &LastSeen {
        &self.last_seen
    }

    /// Handle one message from `origin`
    pub async fn handle_message(&self, origin: &Arc<dyn Connection>, text: &str) {
        let message = Message::parse(text);
        match message {
            Message::Ping => {
                if let Err(e) = origin.send(&Message::Pong).await {
                    debug!(connection = %origin.id(), "Failed to answer ping: {}", e);
                }
            }
            Message::GetClipboard => self.send_current_clipboard(origin).await,
            Message::ClipboardUpdate(payload) => {
                debug!(connection = %origin.id(), "Received clipboard update");
                let outcome = self.applier.apply_incoming(&payload).await;
                self.notify_others(origin.id(), outcome).await;
            }
            ref other if other.is_liveness_noise() => {
                debug!(connection = %origin.id(), "Ignoring {} message", other.label());
            }
            _ => {
                debug!(connection = %origin.id(), "Received legacy clipboard message");
                let outcome = self.applier.apply_entry(ClipboardEntry::text(text)).await;
                self.notify_others(origin.id(), outcome).await;
            }
        }
    }

    async fn notify_others(&self, origin: ConnectionId, outcome: ApplyOutcome) {
        if outcome == ApplyOutcome::Written {
            self.registry
                .broadcast(&Message::NewClipboard, Some(origin))
                .await;
        }
    }

    async fn send_current_clipboard(&self, origin: &Arc<dyn Connection>) {
        let payload = match self.provider.read().await {
            Ok(Some(entry)) if !entry.is_empty() => {
                info!(connection = %origin.id(), "Sending clipboard content: {}", entry.preview());
                codec::encode(&entry)
            }
            Ok(_) => {
                info!(connection = %origin.id(), "Sending empty clipboard content");
                String::new()
            }
            Err(e) if e.is_unavailable() => {
                debug!("Cannot read clipboard for {}: {}", origin.remote(), e);
                String::new()
            }
            Err(e) => {
                warn!("Failed to read clipboard for {}: {}", origin.remote(), e);
                String::new()
            }
        };

        if let Err(e) = origin.send(&Message::ClipboardContent(payload)).await {
            if e.is_disconnect() {
                debug!(connection = %origin.id(), "Client gone before reply: {}", e);
            } else {
                warn!(connection = %origin.id(), "Failed to send clipboard content: {}", e);
            }
        }
    }

    /// Serve one accepted socket until it closes or `shutdown` fires
    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        addr: SocketAddr,
        config: WebSocketConfig,
        shutdown: Shutdown,
    ) {
        let (connection, mut reader) = match websocket::upgrade(stream, addr, &config).await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                warn!("WebSocket handshake with {} failed: {}", addr, e);
                return;
            }
        };
        let connected_at = connection.connected_at();
        let connection: Arc<dyn Connection> = connection;
        let id = connection.id();
        info!(connection = %id, "Client connected from {}", addr);
        reader.set_idle_timeout(self.timing.idle_timeout());

        self.registry.register(connection.clone()).await;
        let (stop_keepalive, keepalive_rx) = watch::channel(false);
        spawn_keepalive(connection.clone(), self.timing.keepalive_interval, keepalive_rx);

        let mut stop = shutdown.subscribe();
        loop {
            tokio::select! {
                _ = stopped(&mut stop) => break,
                frame = reader.next_text() => match frame {
                    Some(Ok(text)) => self.handle_message(&connection, &text).await,
                    Some(Err(e)) => {
                        if e.is_disconnect() {
                            debug!(connection = %id, "Connection closed: {}", e);
                        } else {
                            warn!(connection = %id, "WebSocket error from {}: {}", addr, e);
                        }
                        break;
                    }
                    None => break,
                },
            }
        }

        stop_keepalive.send_replace(true);
        self.registry.unregister(id).await;
        let connected_for = Utc::now() - connected_at;
        info!(
            connection = %id,
            "Client {} disconnected after {}s",
            addr,
            connected_for.num_seconds()
        );
    }

    /// Accept peers on `listener` until `shutdown` fires
    ///
    /// Also runs the relay's own clipboard detector. On shutdown every open
    /// connection is closed within the configured grace period.
    pub async fn serve(self: Arc<Self>, listener: WsListener, shutdown: Shutdown) -> crate::Result<()> {
        let local = listener.local_addr()?;
        info!("Relay ready on ws://{}{}", local, listener.config().path);

        let detector = ChangeDetector::new(
            Role::Relay,
            self.provider.clone(),
            self.last_seen.clone(),
            self.timing.detector.clone(),
        );
        let relay = self.clone();
        let detector_stop = shutdown.subscribe();
        let detector_task = tokio::spawn(async move {
            let reason = detector.run(&*relay, detector_stop).await;
            info!("Relay clipboard monitoring ended: {}", reason);
        });

        let mut stop = shutdown.subscribe();
        loop {
            tokio::select! {
                _ = stopped(&mut stop) => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("Accepted TCP connection from {}", addr);
                        let relay = self.clone();
                        tokio::spawn(relay.handle_connection(
                            stream,
                            addr,
                            listener.config().clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => warn!("Failed to accept connection: {}", e),
                },
            }
        }

        info!("Relay shutting down");
        self.registry.close_all(self.timing.shutdown_grace).await;
        if tokio::time::timeout(self.timing.shutdown_grace, detector_task)
            .await
            .is_err()
        {
            debug!("Clipboard monitor did not stop within {:?}", self.timing.shutdown_grace);
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeSink for Relay {
    async fn on_local_change(&self, _encoded: String) {
        let report = self.registry.broadcast(&Message::NewClipboard, None).await;
        info!(notified = report.delivered, "Notified clients about clipboard change");
    }
}
