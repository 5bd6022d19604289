//! Public types for the session manager.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use feedwire_protocol::constants::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT};

use crate::error::SessionError;

/// Connection state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Handshake in progress, or waiting out a reconnect backoff.
    Connecting,
    Connected,
}

/// Notifications delivered to session subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Connected and all registered topics were replayed.
    Connected,
    /// The connection went away.
    ///
    /// `manual` is `true` when the caller asked for the disconnect. For
    /// unexpected loss (including heartbeat timeouts and failed replays)
    /// it is `false` and `reason` carries the cause when known.
    Disconnected {
        manual: bool,
        reason: Option<Arc<SessionError>>,
    },
    /// A message published on a subscribed topic.
    Message {
        topic: String,
        payload: serde_json::Value,
    },
    /// A heartbeat probe was answered.
    Pong {
        latency: Duration,
        sent_at: DateTime<Utc>,
    },
}

/// Heartbeat timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Silence allowed before a probe is sent.
    pub interval: Duration,
    /// Time a probe may stay unanswered before a reconnect.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            timeout: DEFAULT_HEARTBEAT_TIMEOUT,
        }
    }
}

/// Session manager configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub heartbeat: HeartbeatConfig,
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(15),
            backoff_factor: 2.0,
        }
    }
}

/// Largest relative deviation applied to a backoff delay.
const JITTER: f64 = 0.25;

/// Lower bound on any backoff delay, unless `initial_delay` is shorter.
const MIN_DELAY: Duration = Duration::from_millis(50);

impl ReconnectConfig {
    /// Backoff before reconnect attempt `attempt` (1-based).
    ///
    /// Starts at `initial_delay`, grows by `backoff_factor` per attempt up
    /// to `max_delay`, and is spread randomly by up to a quarter either
    /// way so clients dropped together do not retry in lockstep.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let steps = attempt.saturating_sub(1).min(64) as i32;
        let grown = self.initial_delay.as_secs_f64() * self.backoff_factor.max(1.0).powi(steps);
        let base = grown.min(self.max_delay.as_secs_f64());
        let spread = rand::thread_rng().gen_range(-JITTER..=JITTER);

        let delay = Duration::try_from_secs_f64(base * (1.0 + spread)).unwrap_or(self.max_delay);
        delay.max(self.initial_delay.min(MIN_DELAY))
    }
}
