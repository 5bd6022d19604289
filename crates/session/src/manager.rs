//! Session manager: the public face of the feed connection.
//!
//! Owns the transport lifecycle, keeps the topic registry, sends
//! subscribe/unsubscribe requests through the nonce correlator, probes
//! liveness with the heartbeat monitor, and replays every registered topic
//! whenever the transport (re)connects.
//!
//! A single dispatch task consumes transport events and heartbeat
//! deadlines in order. Anything that waits on a network round-trip is
//! spawned off that task so RESPONSE packets keep flowing.

use std::sync::{Arc, Mutex, MutexGuard};

use feedwire_auth::{CredentialInput, CredentialSource, TokenResolver};
use feedwire_protocol::{ClientPacket, RequestKind, ServerPacket};
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::correlator::NonceCorrelator;
use crate::error::SessionError;
use crate::heartbeat::{HeartbeatAction, HeartbeatMonitor};
use crate::lock;
use crate::registry::TopicRegistry;
use crate::transport::{Transport, TransportEvent};
use crate::types::{ConnectionState, SessionConfig, SessionEvent};

/// Handle to a feed session. Clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    transport: Arc<dyn Transport>,
    resolver: TokenResolver,
    registry: Mutex<TopicRegistry>,
    correlator: NonceCorrelator,
    heartbeat: Mutex<HeartbeatMonitor>,
    observers: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
    /// Cancelled when the current connection goes away; aborts its replay.
    connection: Mutex<CancellationToken>,
    /// Why we tore the connection down ourselves, reported on the next
    /// disconnect instead of a plain manual close.
    pending_reason: Mutex<Option<SessionError>>,
    cancel: CancellationToken,
}

impl SessionManager {
    /// Creates a session over `transport` and starts its dispatch task.
    ///
    /// Must be called inside a tokio runtime. Fails with
    /// [`SessionError::EventsTaken`] if the transport's events were already
    /// claimed.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        resolver: TokenResolver,
    ) -> Result<Self, SessionError> {
        let events = transport.take_events().ok_or(SessionError::EventsTaken)?;
        let cancel = CancellationToken::new();
        let inner = Arc::new(SessionInner {
            transport,
            resolver,
            registry: Mutex::new(TopicRegistry::new()),
            correlator: NonceCorrelator::new(),
            heartbeat: Mutex::new(HeartbeatMonitor::new(config.heartbeat)),
            observers: Mutex::new(Vec::new()),
            connection: Mutex::new(cancel.child_token()),
            pending_reason: Mutex::new(None),
            cancel,
        });
        tokio::spawn(dispatch_loop(inner.clone(), events));
        Ok(Self { inner })
    }

    /// Registers a new observer. Events are delivered in emission order to
    /// every observer still listening.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.inner.observers).push(tx);
        rx
    }

    /// Subscribes to topics with one credential.
    ///
    /// The topics are recorded immediately and replayed on every reconnect.
    /// If the session is connected, a LISTEN for exactly these topics is
    /// sent and this call resolves with the server's answer. A failure
    /// here leaves the registry updated.
    pub async fn listen(
        &self,
        topics: impl IntoTopics,
        credential: impl Into<CredentialInput>,
        scope: Option<&str>,
    ) -> Result<(), SessionError> {
        let topics = topics.into_topics();
        if topics.is_empty() {
            return Ok(());
        }
        let source = CredentialSource::wrap(credential, scope)?;
        lock(&self.inner.registry).set(topics.iter().cloned(), &source);
        debug!(?topics, source = source.kind(), "topics registered");

        if !self.inner.transport.is_connected() {
            return Ok(());
        }
        let token = self.inner.resolver.resolve(&source).await?;
        self.inner
            .correlator
            .request(&*self.inner.transport, RequestKind::Listen, topics, token)
            .await
    }

    /// Unsubscribes from topics.
    ///
    /// The registry entries are removed whatever the server answers.
    pub async fn unlisten(&self, topics: impl IntoTopics) -> Result<(), SessionError> {
        let topics = topics.into_topics();
        if topics.is_empty() {
            return Ok(());
        }
        lock(&self.inner.registry).delete(&topics);
        debug!(?topics, "topics removed");

        if !self.inner.transport.is_connected() {
            return Ok(());
        }
        self.inner
            .correlator
            .request(&*self.inner.transport, RequestKind::Unlisten, topics, None)
            .await
    }

    /// Opens the connection. No-op if connected or already connecting.
    pub async fn connect(&self) -> Result<(), SessionError> {
        if self.is_connected() || self.is_connecting() {
            return Ok(());
        }
        self.inner.transport.connect().await?;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.inner.transport.disconnect().await?;
        Ok(())
    }

    /// Closes and reopens the connection.
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        self.inner.reconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.inner.transport.is_connecting()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.transport.state()
    }

    pub fn has_any_topics(&self) -> bool {
        !lock(&self.inner.registry).is_empty()
    }

    /// Registered topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        lock(&self.inner.registry).topics()
    }

    /// Stops the dispatch task. The transport is left as it is.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        info!("session shut down");
    }
}

impl SessionInner {
    fn heartbeat(&self) -> MutexGuard<'_, HeartbeatMonitor> {
        lock(&self.heartbeat)
    }

    fn emit(&self, event: SessionEvent) {
        lock(&self.observers).retain(|tx| tx.send(event.clone()).is_ok());
    }

    async fn reconnect(&self) -> Result<(), SessionError> {
        self.transport.disconnect().await?;
        self.transport.connect().await?;
        Ok(())
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        let inner = self.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.reconnect().await {
                warn!(error = %e, "reconnect failed");
            }
        });
    }

    fn handle_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                info!("connected to feed");
                lock(&self.pending_reason).take();
                let connection = self.cancel.child_token();
                std::mem::replace(&mut *lock(&self.connection), connection.clone()).cancel();
                // Pings cover the replay too.
                self.heartbeat().start(Instant::now());
                tokio::spawn(self.clone().on_connected(connection));
            }
            TransportEvent::Disconnected { manual, reason } => {
                lock(&self.connection).cancel();
                self.heartbeat().stop();
                let (manual, reason) = match lock(&self.pending_reason).take() {
                    Some(own) => (false, Some(own)),
                    None => (manual, reason.map(SessionError::UnexpectedDisconnect)),
                };
                match &reason {
                    Some(e) => warn!(manual, error = %e, "disconnected from feed"),
                    None => info!(manual, "disconnected from feed"),
                }
                self.emit(SessionEvent::Disconnected {
                    manual,
                    reason: reason.map(Arc::new),
                });
            }
            TransportEvent::Line(line) => self.handle_line(&line),
        }
    }

    fn handle_line(self: &Arc<Self>, line: &str) {
        let now = Instant::now();
        self.heartbeat().record_activity(now);

        let packet = match ServerPacket::decode(line) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "dropping undecodable line");
                return;
            }
        };

        match &packet {
            ServerPacket::Pong => {
                let report = self.heartbeat().on_pong(now);
                match report {
                    Some(report) => {
                        debug!(latency_ms = report.latency.as_millis() as u64, "pong");
                        self.emit(SessionEvent::Pong {
                            latency: report.latency,
                            sent_at: report.sent_at,
                        });
                    }
                    None => debug!("unsolicited pong"),
                }
            }
            ServerPacket::Reconnect => {
                info!("server requested reconnect");
                self.spawn_reconnect();
            }
            ServerPacket::Response { nonce, .. } => {
                self.correlator.resolve(nonce, packet.error_text());
            }
            ServerPacket::Message { data } => match data.decode() {
                Ok(payload) => {
                    trace!(topic = %data.topic, "message");
                    self.emit(SessionEvent::Message {
                        topic: data.topic.clone(),
                        payload,
                    });
                }
                Err(e) => warn!(topic = %data.topic, error = %e, "undecodable message payload"),
            },
            ServerPacket::Unknown => warn!(line, "ignoring unknown packet type"),
        }
    }

    fn on_heartbeat_deadline(self: &Arc<Self>) {
        let action = self.heartbeat().on_deadline(Instant::now());
        match action {
            Some(HeartbeatAction::SendPing) => {
                trace!("sending heartbeat ping");
                let sent = ClientPacket::Ping
                    .encode()
                    .map_err(SessionError::from)
                    .and_then(|line| self.transport.send_line(line).map_err(SessionError::from));
                if let Err(e) = sent {
                    warn!(error = %e, "failed to send ping");
                }
            }
            Some(HeartbeatAction::Reconnect) => {
                warn!("heartbeat timed out, reconnecting");
                *lock(&self.pending_reason) = Some(SessionError::HeartbeatTimeout);
                self.spawn_reconnect();
            }
            None => {}
        }
    }

    /// Replays the registry on a fresh connection and reports the outcome.
    async fn on_connected(self: Arc<Self>, connection: CancellationToken) {
        tokio::select! {
            _ = connection.cancelled() => {
                debug!("connection lost during replay");
            }
            result = self.replay() => {
                if connection.is_cancelled() || !self.transport.is_connected() {
                    return;
                }
                match result {
                    Ok(()) => self.emit(SessionEvent::Connected),
                    Err(e) => self.emit(SessionEvent::Disconnected {
                        manual: false,
                        reason: Some(Arc::new(e)),
                    }),
                }
            }
        }
    }

    /// Sends one LISTEN per distinct token. Every group is attempted; the
    /// first failure is returned.
    async fn replay(&self) -> Result<(), SessionError> {
        let resend = lock(&self.registry).group_for_resend(&self.resolver);
        let plan = resend.await;

        let mut first_error: Option<SessionError> = None;
        for failure in plan.failures {
            warn!(topics = ?failure.topics, error = %failure.error, "could not resolve token, topics not replayed");
            if first_error.is_none() {
                first_error = Some(failure.error.into());
            }
        }

        let results = join_all(plan.batches.iter().map(|batch| {
            self.correlator.request(
                &*self.transport,
                RequestKind::Listen,
                batch.topics.clone(),
                batch.token.clone(),
            )
        }))
        .await;

        let mut replayed = Vec::new();
        for (batch, result) in plan.batches.iter().zip(results) {
            match result {
                Ok(()) => replayed.extend(batch.topics.iter().map(String::as_str)),
                Err(e) => {
                    warn!(topics = ?batch.topics, error = %e, "replay request failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        info!(
            topics = replayed.len(),
            requests = plan.batches.len(),
            "subscriptions replayed"
        );
        debug!(topics = ?replayed, "replayed topics");

        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

async fn dispatch_loop(
    inner: Arc<SessionInner>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    loop {
        let deadline = inner.heartbeat().next_deadline();
        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = sleep_until(deadline) => inner.on_heartbeat_deadline(),
            event = events.recv() => match event {
                Some(event) => inner.handle_transport_event(event),
                None => {
                    debug!("transport event stream ended");
                    break;
                }
            },
        }
    }
    inner.heartbeat().stop();
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Anything `listen`/`unlisten` accept as a topic list.
pub trait IntoTopics {
    fn into_topics(self) -> Vec<String>;
}

impl IntoTopics for &str {
    fn into_topics(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoTopics for String {
    fn into_topics(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoTopics for Vec<String> {
    fn into_topics(self) -> Vec<String> {
        self
    }
}

impl IntoTopics for Vec<&str> {
    fn into_topics(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl IntoTopics for &[&str] {
    fn into_topics(self) -> Vec<String> {
        self.iter().map(|t| t.to_string()).collect()
    }
}

impl IntoTopics for &[String] {
    fn into_topics(self) -> Vec<String> {
        self.to_vec()
    }
}

impl<const N: usize> IntoTopics for [&str; N] {
    fn into_topics(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}
