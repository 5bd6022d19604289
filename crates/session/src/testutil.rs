//! In-memory transport for driving the session without sockets.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use feedwire_auth::{AuthFuture, TokenInfo, TokenResolver, TokenValidator};
use feedwire_protocol::ClientPacket;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::lock;
use crate::transport::{Transport, TransportEvent, TransportFuture};

/// Validator that accepts every token.
pub(crate) struct AcceptAll;

impl TokenValidator for AcceptAll {
    fn validate<'a>(&'a self, _token: &'a str) -> AuthFuture<'a, TokenInfo> {
        Box::pin(async {
            Ok(TokenInfo {
                client_id: "test-client".into(),
                login: None,
                user_id: None,
                scopes: vec![],
                expires_in: None,
            })
        })
    }
}

pub(crate) fn resolver() -> TokenResolver {
    TokenResolver::new(Arc::new(AcceptAll))
}

pub(crate) struct MockTransport {
    connected: AtomicBool,
    connecting: AtomicBool,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    sent_tx: mpsc::UnboundedSender<String>,
    pub(crate) connects: AtomicUsize,
    pub(crate) disconnects: AtomicUsize,
}

/// The "server" side of a [`MockTransport`].
pub(crate) struct MockRemote {
    transport: Arc<MockTransport>,
    sent_rx: mpsc::UnboundedReceiver<String>,
}

impl MockTransport {
    fn build(connected: bool) -> (Arc<Self>, MockRemote) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            connected: AtomicBool::new(connected),
            connecting: AtomicBool::new(false),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            sent_tx,
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        });
        let remote = MockRemote {
            transport: transport.clone(),
            sent_rx,
        };
        (transport, remote)
    }

    pub(crate) fn connected() -> (Arc<Self>, MockRemote) {
        Self::build(true)
    }

    pub(crate) fn disconnected() -> (Arc<Self>, MockRemote) {
        Self::build(false)
    }

    pub(crate) fn set_connecting(&self, connecting: bool) {
        self.connecting.store(connecting, Ordering::SeqCst);
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events_tx.send(event);
    }
}

impl Transport for MockTransport {
    fn connect(&self) -> TransportFuture<'_> {
        Box::pin(async move {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.connected.store(true, Ordering::SeqCst);
            self.emit(TransportEvent::Connected);
            Ok(())
        })
    }

    fn disconnect(&self) -> TransportFuture<'_> {
        Box::pin(async move {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            if self.connected.swap(false, Ordering::SeqCst) {
                self.emit(TransportEvent::Disconnected {
                    manual: true,
                    reason: None,
                });
            }
            Ok(())
        })
    }

    fn send_line(&self, line: String) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.sent_tx.send(line).map_err(|_| TransportError::Closed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::SeqCst)
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        lock(&self.events_rx).take()
    }
}

impl MockRemote {
    /// Next line written by the client. Panics after a generous timeout so
    /// a broken test fails instead of hanging.
    pub(crate) async fn next_sent(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(3600), self.sent_rx.recv())
            .await
            .expect("timed out waiting for a sent line")
            .expect("transport dropped")
    }

    /// Next line, decoded.
    pub(crate) async fn next_packet(&mut self) -> ClientPacket {
        serde_json::from_str(&self.next_sent().await).expect("client sent invalid JSON")
    }

    /// A line if one is already queued.
    pub(crate) fn try_sent(&mut self) -> Option<String> {
        self.sent_rx.try_recv().ok()
    }

    pub(crate) fn push_line(&self, line: impl Into<String>) {
        self.transport.emit(TransportEvent::Line(line.into()));
    }

    /// Answers a request packet.
    pub(crate) fn respond(&self, packet: &ClientPacket, error: &str) {
        let nonce = packet.nonce().expect("request without nonce");
        self.push_line(
            serde_json::json!({ "type": "RESPONSE", "nonce": nonce, "error": error }).to_string(),
        );
    }

    /// Simulates an unexpected connection loss.
    pub(crate) fn drop_connection(&self, reason: Option<TransportError>) {
        self.transport.connected.store(false, Ordering::SeqCst);
        self.transport.emit(TransportEvent::Disconnected {
            manual: false,
            reason,
        });
    }

    /// Simulates the transport's own reconnect succeeding.
    pub(crate) fn restore_connection(&self) {
        self.transport.connected.store(true, Ordering::SeqCst);
        self.transport.emit(TransportEvent::Connected);
    }
}
