//! WebSocket line transport with automatic reconnection.
//!
//! The first [`WsTransport::connect`] performs its handshake inline so a
//! bad URL or an unreachable feed is reported to the caller. Once a socket
//! has been established, later connects never fail on the handshake: the
//! background worker keeps retrying with exponential backoff, in the
//! `Connecting` state, until it gets through or
//! [`WsTransport::disconnect`] is called. The worker owns the socket and
//! runs the read and write pumps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use futures_util::stream::SplitStream;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use feedwire_protocol::constants::{DEFAULT_FEED_URL, MAX_MESSAGE_SIZE};

use crate::error::TransportError;
use crate::lock;
use crate::pumps::read::{ReadEnd, read_pump};
use crate::pumps::write::write_pump;
use crate::transport::{Transport, TransportEvent, TransportFuture};
use crate::types::{ConnectionState, ReconnectConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WriteSlot = Arc<Mutex<Option<mpsc::UnboundedSender<tungstenite::Message>>>>;

/// Settings for [`WsTransport`].
#[derive(Debug, Clone)]
pub struct WsTransportConfig {
    pub url: String,
    pub reconnect: ReconnectConfig,
    /// Largest accepted inbound message, in bytes.
    pub max_message_size: usize,
}

impl Default for WsTransportConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
            reconnect: ReconnectConfig::default(),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// State shared between the transport handle and its worker.
#[derive(Clone)]
struct WorkerContext {
    config: WsTransportConfig,
    state: watch::Sender<ConnectionState>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    write_slot: WriteSlot,
}

/// [`Transport`] over a WebSocket, one text frame per line.
pub struct WsTransport {
    ctx: WorkerContext,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    worker: tokio::sync::Mutex<Option<Worker>>,
    /// Set after the first successful handshake.
    established: AtomicBool,
}

impl WsTransport {
    pub fn new(config: WsTransportConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            ctx: WorkerContext {
                config,
                state,
                events_tx,
                write_slot: Arc::new(Mutex::new(None)),
            },
            events_rx: Mutex::new(Some(events_rx)),
            worker: tokio::sync::Mutex::new(None),
            established: AtomicBool::new(false),
        }
    }

    /// Follows connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.ctx.state.subscribe()
    }

    pub fn url(&self) -> &str {
        &self.ctx.config.url
    }

    async fn start(&self) -> Result<(), TransportError> {
        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return Ok(());
        }

        self.ctx.state.send_replace(ConnectionState::Connecting);
        let cancel = CancellationToken::new();
        let live = match open(&self.ctx.config).await {
            Ok(stream) => {
                info!(url = %self.ctx.config.url, "WebSocket connected");
                self.established.store(true, Ordering::SeqCst);
                Some(go_live(&self.ctx, stream, &cancel))
            }
            Err(e) if !self.established.load(Ordering::SeqCst) => {
                self.ctx.state.send_replace(ConnectionState::Disconnected);
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "handshake failed, retrying in the background");
                None
            }
        };
        let handle = tokio::spawn(run_worker(self.ctx.clone(), live, cancel.clone()));
        *worker = Some(Worker { cancel, handle });
        Ok(())
    }

    async fn stop(&self) {
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            worker.cancel.cancel();
            if let Err(e) = worker.handle.await {
                warn!("transport worker ended abnormally: {e}");
            }
        }
        self.ctx.state.send_replace(ConnectionState::Disconnected);
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(WsTransportConfig::default())
    }
}

impl Transport for WsTransport {
    fn connect(&self) -> TransportFuture<'_> {
        Box::pin(self.start())
    }

    fn disconnect(&self) -> TransportFuture<'_> {
        Box::pin(async move {
            self.stop().await;
            Ok(())
        })
    }

    fn send_line(&self, line: String) -> Result<(), TransportError> {
        let slot = lock(&self.ctx.write_slot);
        let tx = slot.as_ref().ok_or(TransportError::NotConnected)?;
        tx.send(tungstenite::Message::Text(line.into()))
            .map_err(|_| TransportError::Closed)
    }

    fn is_connected(&self) -> bool {
        *self.ctx.state.borrow() == ConnectionState::Connected
    }

    fn is_connecting(&self) -> bool {
        *self.ctx.state.borrow() == ConnectionState::Connecting
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        lock(&self.events_rx).take()
    }
}

async fn open(config: &WsTransportConfig) -> Result<WsStream, TransportError> {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_size);
    ws_config.max_frame_size = Some(config.max_message_size);
    let (stream, _) =
        tokio_tungstenite::connect_async_with_config(config.url.as_str(), Some(ws_config), false)
            .await?;
    Ok(stream)
}

/// One established socket with its write pump running.
struct Live {
    read: SplitStream<WsStream>,
    write_tx: mpsc::UnboundedSender<tungstenite::Message>,
    writer: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Publishes a fresh socket: starts its write pump, opens the write slot,
/// flips the state to connected and announces it.
fn go_live(ctx: &WorkerContext, stream: WsStream, cancel: &CancellationToken) -> Live {
    let (write, read) = stream.split();
    let (write_tx, write_rx) = mpsc::unbounded_channel();
    let session_cancel = cancel.child_token();
    let writer = tokio::spawn(write_pump(write, write_rx, session_cancel.clone()));

    *lock(&ctx.write_slot) = Some(write_tx.clone());
    ctx.state.send_replace(ConnectionState::Connected);
    let _ = ctx.events_tx.send(TransportEvent::Connected);

    Live {
        read,
        write_tx,
        writer,
        cancel: session_cancel,
    }
}

/// Owns the socket for the lifetime of one `connect`/`disconnect` pair.
///
/// Starts in the backoff loop when `live` is `None`.
async fn run_worker(ctx: WorkerContext, mut live: Option<Live>, cancel: CancellationToken) {
    loop {
        if let Some(current) = live.take() {
            match run_session(&ctx, current).await {
                ReadEnd::Cancelled => {
                    stopped(&ctx);
                    debug!("transport worker stopped");
                    return;
                }
                ReadEnd::Lost(reason) => {
                    warn!(error = %reason, "WebSocket connection lost");
                    ctx.state.send_replace(ConnectionState::Connecting);
                    let _ = ctx.events_tx.send(TransportEvent::Disconnected {
                        manual: false,
                        reason: Some(reason),
                    });
                }
            }
        }

        match reconnect(&ctx, &cancel).await {
            Some(stream) => live = Some(go_live(&ctx, stream, &cancel)),
            None => {
                stopped(&ctx);
                debug!("reconnect cancelled");
                return;
            }
        }
    }
}

/// Publishes a caller-initiated disconnect.
fn stopped(ctx: &WorkerContext) {
    ctx.state.send_replace(ConnectionState::Disconnected);
    let _ = ctx.events_tx.send(TransportEvent::Disconnected {
        manual: true,
        reason: None,
    });
}

/// Reads from a live socket until it drops or the worker is cancelled.
async fn run_session(ctx: &WorkerContext, live: Live) -> ReadEnd {
    let end = read_pump(
        live.read,
        ctx.events_tx.clone(),
        live.write_tx,
        ctx.config.max_message_size,
        live.cancel.clone(),
    )
    .await;

    lock(&ctx.write_slot).take();
    live.cancel.cancel();
    let _ = live.writer.await;
    end
}

/// Retries the handshake with backoff. `None` means cancelled.
async fn reconnect(ctx: &WorkerContext, cancel: &CancellationToken) -> Option<WsStream> {
    let mut attempt: u32 = 0;
    loop {
        attempt = attempt.saturating_add(1);
        let delay = ctx.config.reconnect.delay_for_attempt(attempt);
        let delay_secs = delay.as_secs_f64();
        info!(
            attempt,
            delay_secs = format_args!("{delay_secs:.1}"),
            "reconnecting"
        );

        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = open(&ctx.config) => result,
        };
        match result {
            Ok(stream) => {
                info!(attempt, "reconnected");
                return Some(stream);
            }
            Err(e) => warn!(attempt, error = %e, "reconnect attempt failed"),
        }
    }
}
