//! WebSocket read pump: forwards inbound text lines.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::TransportError;
use crate::transport::TransportEvent;

/// Why the read pump stopped.
#[derive(Debug)]
pub(crate) enum ReadEnd {
    Cancelled,
    Lost(TransportError),
}

/// Reads frames until the socket ends or `cancel` fires.
///
/// Text frames become [`TransportEvent::Line`]s. WebSocket pings are
/// answered here; liveness at the feed level is the session's job.
pub(crate) async fn read_pump<S>(
    mut read: S,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    write_tx: mpsc::UnboundedSender<tungstenite::Message>,
    max_message_size: usize,
    cancel: CancellationToken,
) -> ReadEnd
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => return ReadEnd::Cancelled,
            msg = read.next() => msg,
        };

        match msg {
            Some(Ok(tungstenite::Message::Text(text))) => {
                if text.len() > max_message_size {
                    warn!("message too large ({} bytes), dropping", text.len());
                    continue;
                }
                if events_tx
                    .send(TransportEvent::Line(text.as_str().to_owned()))
                    .is_err()
                {
                    return ReadEnd::Cancelled;
                }
            }
            Some(Ok(tungstenite::Message::Ping(data))) => {
                trace!("received ping, sending pong");
                let _ = write_tx.send(tungstenite::Message::Pong(data));
            }
            Some(Ok(tungstenite::Message::Close(frame))) => {
                debug!(?frame, "received close frame");
                let err = match frame {
                    Some(f) if !f.reason.is_empty() => TransportError::Remote(f.reason.to_string()),
                    _ => TransportError::Closed,
                };
                return ReadEnd::Lost(err);
            }
            Some(Ok(_)) => {} // Binary, Pong, raw frames: ignore
            Some(Err(e)) => {
                warn!("WebSocket read error: {e}");
                return ReadEnd::Lost(e.into());
            }
            None => {
                debug!("WebSocket stream ended");
                return ReadEnd::Lost(TransportError::Closed);
            }
        }
    }
}
