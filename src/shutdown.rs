//! Process shutdown handling
//!
//! A [`Shutdown`] is a cloneable handle over a watch channel. Termination
//! signals flip it once; every long-running task holds a receiver and exits
//! at its next suspension point.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolve once shutdown was requested
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        stopped(&mut rx).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once `rx` reads `true` or its sender is gone
pub async fn stopped(rx: &mut watch::Receiver<bool>) {
    loop {
        let stop = *rx.borrow_and_update();
        if stop {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Setup signal handlers for graceful shutdown
///
/// SIGINT, SIGTERM and SIGHUP on Unix, Ctrl+C elsewhere.
pub fn install_signal_handlers(shutdown: Shutdown) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received termination signal, shutting down gracefully");
        shutdown.trigger();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            return ctrl_c().await;
        }
    };
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to install SIGHUP handler: {}", e);
            return ctrl_c().await;
        }
    };

    tokio::select! {
        _ = ctrl_c() => {}
        _ = terminate.recv() => {}
        _ = hangup.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        // Without a signal source only an explicit trigger can stop us.
        std::future::pending::<()>().await;
    }
}
