//! Reconnection backoff
//!
//! The sync core never reconnects on its own; the command line wraps a peer
//! session in this backoff when `--reconnect` is given.

use std::time::Duration;

/// Reconnection configuration
#[derive(Debug, Clone)]
pub struct ReconnectionConfig {
    /// Maximum number of reconnection attempts (0 = infinite)
    pub max_attempts: u32,

    /// Initial delay between reconnection attempts
    pub initial_delay: Duration,

    /// Maximum delay between attempts
    pub max_delay: Duration,

    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

/// Exponential backoff state for one peer
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectionConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: ReconnectionConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay before the next attempt, or `None` when attempts are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts != 0 && self.attempt >= self.config.max_attempts {
            return None;
        }

        let factor = self.config.backoff_multiplier.powi(self.attempt as i32);
        let delay = self.config.initial_delay.as_secs_f64() * factor;
        self.attempt = self.attempt.saturating_add(1);

        Some(Duration::from_secs_f64(delay.min(self.config.max_delay.as_secs_f64())))
    }

    /// Forget failures after a connection was established
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}
