//! Nonce-based request/response correlation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use feedwire_protocol::{ClientPacket, RequestKind, generate_nonce};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{SessionError, TransportError};
use crate::lock;
use crate::transport::Transport;

struct Pending {
    kind: RequestKind,
    tx: oneshot::Sender<Option<String>>,
}

type PendingMap = Arc<Mutex<HashMap<String, Pending>>>;

/// Matches RESPONSE packets to the LISTEN/UNLISTEN request that caused them.
///
/// Requests wait as long as it takes; there is no per-request timeout.
/// Entries are removed when the matching response arrives or when the
/// waiting future is dropped.
#[derive(Clone, Default)]
pub struct NonceCorrelator {
    pending: PendingMap,
}

impl NonceCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends a nonced request and waits for its response.
    ///
    /// Resolves with `Ok(())` when the server answers without an error, and
    /// with [`SessionError::RequestRejected`] carrying the server's error
    /// text otherwise.
    pub async fn request(
        &self,
        transport: &dyn Transport,
        kind: RequestKind,
        topics: Vec<String>,
        auth_token: Option<String>,
    ) -> Result<(), SessionError> {
        let nonce = generate_nonce();
        let line = ClientPacket::request(kind, nonce.clone(), topics, auth_token).encode()?;

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(nonce.clone(), Pending { kind, tx });
        let _guard = PendingGuard {
            pending: self.pending.clone(),
            nonce: nonce.clone(),
        };

        transport.send_line(line)?;
        trace!(%kind, %nonce, "request sent");

        match rx.await {
            Ok(None) => Ok(()),
            Ok(Some(message)) => Err(SessionError::RequestRejected { kind, message }),
            Err(_) => Err(SessionError::Transport(TransportError::Closed)),
        }
    }

    /// Completes the request waiting on `nonce`.
    ///
    /// Returns `false` when no request is waiting on it, which is not an
    /// error: the response may belong to a request that was abandoned.
    pub fn resolve(&self, nonce: &str, error: Option<&str>) -> bool {
        let Some(pending) = lock(&self.pending).remove(nonce) else {
            debug!(%nonce, "response for unknown nonce");
            return false;
        };
        trace!(kind = %pending.kind, %nonce, error, "response matched");
        let _ = pending.tx.send(error.map(str::to_string));
        true
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

/// Removes the pending entry on every exit path of a request.
struct PendingGuard {
    pending: PendingMap,
    nonce: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.nonce);
    }
}
