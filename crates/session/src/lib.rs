//! Session manager for the feedwire pub/sub feed.
//!
//! Keeps one logical connection to the feed, multiplexes topic
//! subscriptions over it, correlates nonced requests with their responses,
//! probes liveness with an application-level heartbeat, and replays every
//! registered topic after each reconnect.

pub mod correlator;
pub mod error;
pub mod heartbeat;
pub mod manager;
mod pumps;
pub mod registry;
pub mod transport;
pub mod types;
pub mod ws_transport;

#[cfg(test)]
pub(crate) mod testutil;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use correlator::NonceCorrelator;
pub use error::{SessionError, TransportError};
pub use heartbeat::{HeartbeatAction, HeartbeatMonitor, HeartbeatState, PongReport};
pub use manager::{IntoTopics, SessionManager};
pub use registry::{ResendBatch, ResendFailure, ResendPlan, TopicRegistry};
pub use transport::{Transport, TransportEvent, TransportFuture};
pub use types::{ConnectionState, HeartbeatConfig, ReconnectConfig, SessionConfig, SessionEvent};
pub use ws_transport::{WsTransport, WsTransportConfig};

/// Locks a std mutex, recovering the data if a holder panicked.
///
/// None of the guarded state can be left half-updated by a panic, so the
/// poisoned value is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
