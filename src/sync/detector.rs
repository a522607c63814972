//! Change detector
//!
//! Polls the local clipboard and reports values that differ from the side's
//! [`LastSeen`] slot. One detector runs per side and connection.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{ChangeSink, LastSeen, Role};
use crate::clipboard::{codec, ClipboardProvider};
use crate::shutdown::stopped;

/// Polling cadence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Sleep between two reads
    pub poll_interval: Duration,
    /// Sleep after a transient read failure
    pub error_backoff: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Why a detector stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The environment has no clipboard; this detector will not read again
    ClipboardUnavailable,
    /// The owning connection or process asked it to stop
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::ClipboardUnavailable => write!(f, "clipboard unavailable"),
            StopReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Initializing,
    Polling,
    Stopped(StopReason),
}

pub struct ChangeDetector {
    role: Role,
    provider: Arc<dyn ClipboardProvider>,
    last_seen: Arc<LastSeen>,
    config: DetectorConfig,
    state: Mutex<DetectorState>,
}

impl ChangeDetector {
    pub fn new(
        role: Role,
        provider: Arc<dyn ClipboardProvider>,
        last_seen: Arc<LastSeen>,
        config: DetectorConfig,
    ) -> Self {
        Self {
            role,
            provider,
            last_seen,
            config,
            state: Mutex::new(DetectorState::Initializing),
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(DetectorState::Stopped(StopReason::Cancelled))
    }

    fn set_state(&self, next: DetectorState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    fn finish(&self, reason: StopReason) -> StopReason {
        self.set_state(DetectorState::Stopped(reason));
        match reason {
            StopReason::ClipboardUnavailable => {
                warn!(role = %self.role, "Clipboard monitoring disabled: no clipboard available")
            }
            StopReason::Cancelled => debug!(role = %self.role, "Clipboard monitoring stopped"),
        }
        reason
    }

    /// Poll until `stop` fires or the clipboard turns out to be unavailable
    ///
    /// Changed, non-empty values are stored in [`LastSeen`] and handed to
    /// `sink`. An empty clipboard is never reported and never clears the slot.
    pub async fn run(&self, sink: &dyn ChangeSink, mut stop: watch::Receiver<bool>) -> StopReason {
        self.set_state(DetectorState::Initializing);
        let cancelled = *stop.borrow();
        if cancelled {
            return self.finish(StopReason::Cancelled);
        }

        match self.provider.read().await {
            Ok(Some(entry)) if !entry.is_empty() => {
                self.last_seen.set(Some(codec::encode(&entry)));
            }
            Ok(_) => {}
            Err(e) if e.is_unavailable() => {
                debug!(role = %self.role, "Initial clipboard read failed: {}", e);
                return self.finish(StopReason::ClipboardUnavailable);
            }
            Err(e) => warn!(role = %self.role, "Initial clipboard read failed: {}", e),
        }

        self.set_state(DetectorState::Polling);
        info!(
            role = %self.role,
            provider = self.provider.name(),
            "Started clipboard monitoring"
        );

        loop {
            if pause(self.config.poll_interval, &mut stop).await {
                return self.finish(StopReason::Cancelled);
            }

            match self.provider.read().await {
                Ok(Some(entry)) if !entry.is_empty() => {
                    let encoded = codec::encode(&entry);
                    if self.last_seen.matches(&encoded) {
                        continue;
                    }
                    self.last_seen.set(Some(encoded.clone()));
                    info!(role = %self.role, "Clipboard changed: {}", entry.preview());
                    sink.on_local_change(encoded).await;
                }
                Ok(_) => {}
                Err(e) if e.is_unavailable() => {
                    debug!(role = %self.role, "Clipboard read failed: {}", e);
                    return self.finish(StopReason::ClipboardUnavailable);
                }
                Err(e) => {
                    warn!(role = %self.role, "Error monitoring clipboard: {}", e);
                    if pause(self.config.error_backoff, &mut stop).await {
                        return self.finish(StopReason::Cancelled);
                    }
                }
            }
        }
    }
}

/// Sleep for `duration`; true if `stop` fired first
async fn pause(duration: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = stopped(stop) => true,
    }
}
