//! Player Connections
//!
//! A [`Connection`] is the world's handle on one live socket: a bounded
//! outbound queue drained by the socket's writer task, plus a kick signal
//! used to stop the session task when the connection is replaced.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::network::protocol::ServerMessage;

/// Identifies one accepted socket for the lifetime of the process.
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Outbound handle attached to a player.
pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::Sender<ServerMessage>,
    kick: Option<oneshot::Sender<()>>,
}

impl Connection {
    /// Wrap an outbound queue and kick signal.
    pub fn new(outbound: mpsc::Sender<ServerMessage>, kick: oneshot::Sender<()>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            outbound,
            kick: Some(kick),
        }
    }

    /// Create a connection together with the receiving ends of its queue
    /// and kick signal.
    pub fn channel(
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ServerMessage>, oneshot::Receiver<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (kick_tx, kick_rx) = oneshot::channel();
        (Self::new(tx, kick_tx), rx, kick_rx)
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a message without waiting.
    ///
    /// A full or closed queue drops the message for this connection only;
    /// returns whether it was queued.
    pub fn send(&self, msg: ServerMessage) -> bool {
        match self.outbound.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                warn!(connection = self.id, kind = msg.kind(), "Outbound queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Signal the owning session task to stop.
    pub fn close(mut self) {
        if let Some(kick) = self.kick.take() {
            let _ = kick.send(());
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.outbound.is_closed())
            .finish()
    }
}
