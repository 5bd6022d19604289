//! Line transport seam.
//!
//! The session manager only needs something that connects, disconnects,
//! writes text lines and reports what happened. [`crate::WsTransport`] is
//! the production implementation; tests drive the manager through an
//! in-memory one.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::types::ConnectionState;

/// Boxed future returned by transport operations.
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;

/// What the transport reports to its owner.
#[derive(Debug)]
pub enum TransportEvent {
    /// A connection (or reconnection) was established.
    Connected,
    /// The connection was lost or closed.
    ///
    /// `manual` is `true` when the loss followed a call to
    /// [`Transport::disconnect`].
    Disconnected {
        manual: bool,
        reason: Option<TransportError>,
    },
    /// One inbound text line.
    Line(String),
}

/// A reconnecting, line-oriented connection.
///
/// After an unexpected loss the transport reconnects on its own and emits
/// [`TransportEvent::Connected`] again.
pub trait Transport: Send + Sync + 'static {
    /// Opens the connection. Resolves once the first attempt succeeded or
    /// failed.
    fn connect(&self) -> TransportFuture<'_>;

    /// Closes the connection and stops reconnecting.
    fn disconnect(&self) -> TransportFuture<'_>;

    /// Queues one text line for sending.
    fn send_line(&self, line: String) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    fn is_connecting(&self) -> bool;

    /// Takes the event receiver. Only the first caller gets it.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>>;

    fn state(&self) -> ConnectionState {
        if self.is_connected() {
            ConnectionState::Connected
        } else if self.is_connecting() {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        }
    }
}
