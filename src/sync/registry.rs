//! Connection registry and broadcaster for the relay
//!
//! The accept loop, each receive loop and the relay's detector all touch the
//! registry, so every access goes through one async mutex. Broadcast holds it
//! for the whole pass.

use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::transport::{Connection, ConnectionId, Message};

/// Result of one broadcast pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub evicted: Vec<ConnectionId>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Arc<dyn Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection, returning the new total
    pub async fn register(&self, connection: Arc<dyn Connection>) -> usize {
        let mut connections = self.connections.lock().await;
        connections.insert(connection.id(), connection);
        info!(clients = connections.len(), "Client added");
        connections.len()
    }

    /// Remove a connection if present
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.lock().await;
        let removed = connections.remove(&id).is_some();
        if removed {
            info!(clients = connections.len(), connection = %id, "Client removed");
        }
        removed
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Send `message` to every connection except `exclude`
    ///
    /// A connection whose send fails is evicted once the pass is complete.
    pub async fn broadcast(&self, message: &Message, exclude: Option<ConnectionId>) -> BroadcastReport {
        let mut connections = self.connections.lock().await;
        let mut report = BroadcastReport::default();

        debug!(clients = connections.len(), "Broadcasting {}", message.label());

        for (id, connection) in connections.iter() {
            if Some(*id) == exclude {
                continue;
            }
            match connection.send(message).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(connection = %id, "Failed to notify client: {}", e);
                    report.evicted.push(*id);
                }
            }
        }

        for id in &report.evicted {
            connections.remove(id);
        }
        if !report.evicted.is_empty() {
            info!(
                clients = connections.len(),
                "Removed {} disconnected client(s)",
                report.evicted.len()
            );
        }

        report
    }

    /// Close and forget every connection, waiting at most `grace`
    pub async fn close_all(&self, grace: Duration) {
        let drained: Vec<Arc<dyn Connection>> = {
            let mut connections = self.connections.lock().await;
            connections.drain().map(|(_, connection)| connection).collect()
        };
        if drained.is_empty() {
            return;
        }

        info!("Closing {} client connection(s)", drained.len());
        let closing = join_all(drained.iter().map(|connection| async move {
            if let Err(e) = connection.close().await {
                debug!(connection = %connection.id(), "Error closing connection: {}", e);
            }
        }));

        if tokio::time::timeout(grace, closing).await.is_err() {
            warn!("Some connections did not close within {:?}", grace);
        }
    }
}
