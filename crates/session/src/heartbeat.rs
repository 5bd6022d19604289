//! Application-level liveness probing.
//!
//! [`HeartbeatMonitor`] is a plain state machine: it owns no timers and
//! performs no I/O. The session's dispatch loop sleeps until
//! [`HeartbeatMonitor::next_deadline`], then feeds the outcome back through
//! [`HeartbeatMonitor::on_deadline`] and acts on the returned
//! [`HeartbeatAction`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::types::HeartbeatConfig;

/// Current heartbeat phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    /// Not connected, or stopped.
    Idle,
    /// Waiting for the inactivity window to expire.
    Armed { deadline: Instant },
    /// A PING is outstanding.
    Probing {
        sent_at: Instant,
        sent_at_wall: DateTime<Utc>,
        deadline: Instant,
    },
}

/// What the owner must do after a deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a PING.
    SendPing,
    /// The PING went unanswered; tear the connection down and reopen it.
    Reconnect,
}

/// Round-trip measurement for an answered probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongReport {
    pub latency: Duration,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    state: HeartbeatState,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            state: HeartbeatState::Idle,
        }
    }

    pub fn state(&self) -> HeartbeatState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != HeartbeatState::Idle
    }

    /// Arms the inactivity window. Called once a connection is ready.
    pub fn start(&mut self, now: Instant) {
        self.state = HeartbeatState::Armed {
            deadline: now + self.config.interval,
        };
    }

    /// Cancels all deadlines.
    pub fn stop(&mut self) {
        self.state = HeartbeatState::Idle;
    }

    /// Restarts the inactivity window after inbound traffic.
    ///
    /// An outstanding probe keeps its own deadline; only a PONG settles it.
    pub fn record_activity(&mut self, now: Instant) {
        if let HeartbeatState::Armed { .. } = self.state {
            self.state = HeartbeatState::Armed {
                deadline: now + self.config.interval,
            };
        }
    }

    /// The instant at which [`Self::on_deadline`] should next be called.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            HeartbeatState::Idle => None,
            HeartbeatState::Armed { deadline } | HeartbeatState::Probing { deadline, .. } => {
                Some(deadline)
            }
        }
    }

    /// Advances the state machine when the current deadline may have passed.
    ///
    /// Returns `None` if nothing is due yet (for example because traffic
    /// moved the deadline while the caller was sleeping).
    pub fn on_deadline(&mut self, now: Instant) -> Option<HeartbeatAction> {
        match self.state {
            HeartbeatState::Armed { deadline } if now >= deadline => {
                self.state = HeartbeatState::Probing {
                    sent_at: now,
                    sent_at_wall: Utc::now(),
                    deadline: now + self.config.timeout,
                };
                Some(HeartbeatAction::SendPing)
            }
            HeartbeatState::Probing { deadline, .. } if now >= deadline => {
                self.state = HeartbeatState::Idle;
                Some(HeartbeatAction::Reconnect)
            }
            _ => None,
        }
    }

    /// Settles an outstanding probe.
    ///
    /// Returns `None` for a PONG nobody asked for.
    pub fn on_pong(&mut self, now: Instant) -> Option<PongReport> {
        let HeartbeatState::Probing {
            sent_at,
            sent_at_wall,
            ..
        } = self.state
        else {
            return None;
        };
        self.state = HeartbeatState::Armed {
            deadline: now + self.config.interval,
        };
        Some(PongReport {
            latency: now.saturating_duration_since(sent_at),
            sent_at: sent_at_wall,
        })
    }
}
