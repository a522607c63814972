//! Keepalive task
//!
//! Sends a native ping on an open connection at a fixed interval so idle
//! channels are not dropped by intermediaries.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::shutdown::stopped;
use crate::transport::Connection;

/// Ping `connection` every `interval` until `stop` fires or a ping fails
pub fn spawn_keepalive(
    connection: Arc<dyn Connection>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stopped(&mut stop) => return,
            }
            if let Err(e) = connection.ping().await {
                debug!(connection = %connection.id(), "Keepalive stopped: {}", e);
                return;
            }
        }
    })
}
