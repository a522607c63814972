//! Clipboard synchronization engine
//!
//! Both sides run the same [`detector::ChangeDetector`] and
//! [`applier::ChangeApplier`] over a shared [`LastSeen`] slot. The relay
//! fans changes out through [`registry::ConnectionRegistry`]; a peer buffers
//! undeliverable updates in [`pending::PendingQueue`].

use async_trait::async_trait;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

pub mod applier;
pub mod detector;
pub mod keepalive;
pub mod peer;
pub mod pending;
pub mod registry;
pub mod relay;

#[cfg(test)]
pub(crate) mod test_support;

pub use applier::{ApplyOutcome, ChangeApplier};
pub use detector::{ChangeDetector, DetectorConfig, DetectorState, StopReason};
pub use peer::PeerSession;
pub use pending::PendingQueue;
pub use registry::ConnectionRegistry;
pub use relay::Relay;

/// Which end of the bridge this process is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Relay,
    Peer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Relay => write!(f, "relay"),
            Role::Peer => write!(f, "peer"),
        }
    }
}

/// Most recently seen encoded entry on one side
///
/// Written by the detector when it sends and by the applier when it writes,
/// so a value that came from the other side is not detected again.
#[derive(Debug, Default)]
pub struct LastSeen {
    value: Mutex<Option<String>>,
}

impl LastSeen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.value.lock().ok().and_then(|value| value.clone())
    }

    pub fn matches(&self, encoded: &str) -> bool {
        self.value
            .lock()
            .map(|value| value.as_deref() == Some(encoded))
            .unwrap_or(false)
    }

    pub fn set(&self, encoded: Option<String>) {
        if let Ok(mut value) = self.value.lock() {
            *value = encoded;
        }
    }
}

/// Receiver of locally detected changes
#[async_trait]
pub trait ChangeSink: Send + Sync {
    /// Called with the encoded entry each time the local clipboard changed
    async fn on_local_change(&self, encoded: String);
}

/// Timing shared by both sides
#[derive(Debug, Clone)]
pub struct SyncTiming {
    pub detector: DetectorConfig,
    pub keepalive_interval: Duration,
    /// How long past a missed keepalive the other side may stay silent
    pub pong_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl SyncTiming {
    /// Longest gap between inbound frames before a channel counts as dead
    pub fn idle_timeout(&self) -> Duration {
        self.keepalive_interval + self.pong_timeout
    }
}

impl Default for SyncTiming {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            keepalive_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(1),
        }
    }
}
