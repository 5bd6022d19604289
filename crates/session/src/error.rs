//! Error types for the session and its transport.

use feedwire_auth::AuthError;
use feedwire_protocol::{ProtocolError, RequestKind};
use tokio_tungstenite::tungstenite;

/// Errors from the underlying line transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    Closed,

    #[error("closed by server: {0}")]
    Remote(String),
}

/// Errors surfaced by the session manager.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("{kind} request rejected: {message}")]
    RequestRejected { kind: RequestKind, message: String },

    #[error("heartbeat timed out")]
    HeartbeatTimeout,

    #[error("disconnected unexpectedly: {0}")]
    UnexpectedDisconnect(#[source] TransportError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport events already taken by another session")]
    EventsTaken,
}
