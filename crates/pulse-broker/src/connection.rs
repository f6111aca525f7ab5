//! Per-client connection handle and transport receive capability.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use pulse_core::ServerMessage;

/// Opaque identifier for a live connection. Never reused: a reconnecting
/// client gets a fresh id.
pub type ClientId = String;

/// Generate a fresh client id.
#[must_use]
pub fn new_client_id() -> ClientId {
    uuid::Uuid::now_v7().to_string()
}

/// Outbound half of a client connection.
///
/// Frames are pre-serialized `Arc<String>` so one broadcast serializes once
/// and every recipient shares the buffer. Sends never block: a full channel
/// counts against the client's lifetime drop budget instead of delaying the
/// caller.
pub struct ClientConnection {
    /// Connection id.
    pub id: ClientId,
    sender: mpsc::Sender<Arc<String>>,
    drops: AtomicU64,
}

impl ClientConnection {
    /// Wrap an outbound channel.
    #[must_use]
    pub fn new(id: ClientId, sender: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            sender,
            drops: AtomicU64::new(0),
        }
    }

    /// Create a connection with a bounded outbound channel of `buffer`
    /// frames, typically `BrokerConfig::client_buffer`.
    #[must_use]
    pub fn channel(id: ClientId, buffer: usize) -> (Arc<Self>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Arc::new(Self::new(id, tx)), rx)
    }

    /// Try to enqueue a frame. Returns `false` on a full or closed channel,
    /// after bumping the drop counter.
    pub fn send(&self, frame: Arc<String>) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(_) => {
                let _ = self.drops.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Serialize and enqueue a single message (direct replies, not
    /// broadcast).
    pub fn send_message(&self, message: &ServerMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                warn!(conn_id = %self.id, error = %e, "failed to serialize reply");
                false
            }
        }
    }

    /// Total frames dropped over this connection's lifetime.
    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }

    /// Whether the receiving side is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receive capability of a client transport.
///
/// `recv` suspends until the next inbound frame and resolves to `None` once
/// the peer has disconnected. The broker treats this as an abstract
/// capability; wire protocols live outside the core.
#[async_trait]
pub trait TransportReceiver: Send {
    /// Next raw inbound frame, or `None` on disconnect.
    async fn recv(&mut self) -> Option<Value>;
}

#[async_trait]
impl TransportReceiver for mpsc::Receiver<Value> {
    async fn recv(&mut self) -> Option<Value> {
        Self::recv(self).await
    }
}
