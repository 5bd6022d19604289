use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Public feed endpoint.
pub const DEFAULT_FEED_URL: &str = "wss://pubsub-edge.twitch.tv";

/// How long the connection may stay silent before a PING probe is sent.
///
/// Any inbound line (not only PONG) restarts this window.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Time to wait for a PONG after a PING before forcing a reconnect.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum inbound line size in bytes (1 MB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Kind of a nonce-correlated request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    #[serde(rename = "LISTEN")]
    Listen,
    #[serde(rename = "UNLISTEN")]
    Unlisten,
}

impl RequestKind {
    /// Wire name of the request type.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Listen => "LISTEN",
            RequestKind::Unlisten => "UNLISTEN",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
