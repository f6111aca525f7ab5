//! Per-client session lifecycle and inbound message routing.
//!
//! A session moves `Connecting → Active → Closing → Closed` and never
//! backwards. Inbound frames are handled one at a time on the session task,
//! so replies to a single client preserve the order of its requests. Close
//! runs cleanup exactly once no matter how many paths race into it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use metrics::counter;
use serde_json::Value;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pulse_core::error::BrokerError;
use pulse_core::protocol::{ClientMessage, ServerMessage};

use crate::connection::{ClientConnection, TransportReceiver};
use crate::subscriptions::SubscriptionRegistry;
use crate::tools::ToolDispatcher;

/// Lifecycle state of one client session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    /// Connection accepted, not yet registered.
    Connecting = 0,
    /// Registered and receiving broadcasts.
    Active = 1,
    /// Close initiated, cleanup in flight.
    Closing = 2,
    /// Cleanup finished. Terminal.
    Closed = 3,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Coordinates one client's lifecycle: registration, inbound routing, and
/// exactly-once teardown.
pub struct SessionCoordinator {
    conn: Arc<ClientConnection>,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<ToolDispatcher>,
    state: AtomicU8,
    cancel: CancellationToken,
}

impl SessionCoordinator {
    /// Create a session in the `Connecting` state.
    #[must_use]
    pub fn new(
        conn: Arc<ClientConnection>,
        registry: Arc<SubscriptionRegistry>,
        dispatcher: Arc<ToolDispatcher>,
    ) -> Self {
        Self {
            conn,
            registry,
            dispatcher,
            state: AtomicU8::new(SessionState::Connecting as u8),
            cancel: CancellationToken::new(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// The session's client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.conn.id
    }

    /// Register the connection and move to `Active`.
    ///
    /// Registration completes before `Active` is published. A `close`
    /// racing this call either loses the state transition and removes the
    /// registration normally, or wins it — in which case the failed
    /// transition here tears the fresh registration back down. A closed
    /// session is never left registered.
    pub async fn connect(&self) {
        if self.state() != SessionState::Connecting {
            return;
        }
        self.registry.register(Arc::clone(&self.conn)).await;
        if self
            .state
            .compare_exchange(
                SessionState::Connecting as u8,
                SessionState::Active as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            // close ran while we were registering
            self.registry.remove(&self.conn.id).await;
            return;
        }
        counter!("pulse_sessions_opened_total").increment(1);
        info!(client_id = %self.conn.id, "session active");
    }

    /// Drive the session until the peer disconnects or `close` is called.
    ///
    /// Frames are handled sequentially; a tool call's reply is sent before
    /// the next frame is read, which keeps one client's replies in request
    /// order.
    pub async fn run<T: TransportReceiver>(&self, mut transport: T) {
        self.connect().await;
        loop {
            select! {
                () = self.cancel.cancelled() => break,
                frame = transport.recv() => match frame {
                    Some(frame) => self.handle_frame(frame).await,
                    None => break,
                },
            }
        }
        self.close().await;
    }

    /// Route one inbound frame. Errors become `error` frames to this client;
    /// nothing here tears the session down.
    pub async fn handle_frame(&self, frame: Value) {
        let message = match ClientMessage::parse(frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(client_id = %self.conn.id, error = %e, "rejected inbound frame");
                self.reply(&ServerMessage::error(None, &e));
                return;
            }
        };
        match message {
            ClientMessage::Subscribe { topics } => {
                for topic in &topics {
                    self.registry.subscribe(&self.conn.id, topic).await;
                }
                debug!(client_id = %self.conn.id, count = topics.len(), "subscribed");
            }
            ClientMessage::Unsubscribe { topics } => {
                for topic in &topics {
                    self.registry.unsubscribe(&self.conn.id, topic).await;
                }
            }
            ClientMessage::ToolCall {
                id,
                tool,
                parameters,
            } => {
                let result = self.dispatcher.dispatch(&tool, parameters).await;
                // The session may have closed while the handler ran; a reply
                // now would go to a torn-down connection.
                if self.state() >= SessionState::Closing {
                    debug!(client_id = %self.conn.id, tool, "discarding result for closed session");
                    return;
                }
                match result {
                    Ok(result) => self.reply(&ServerMessage::ToolResult { id, result }),
                    Err(e) => self.reply(&ServerMessage::error(Some(id), &e)),
                }
            }
            ClientMessage::ListTools => {
                self.reply(&ServerMessage::ToolList {
                    tools: self.dispatcher.definitions(),
                });
            }
            ClientMessage::Unknown { kind } => {
                let err = BrokerError::UnsupportedMessage { kind };
                self.reply(&ServerMessage::error(None, &err));
            }
        }
    }

    /// Tear the session down. Idempotent and exactly-once: the first caller
    /// wins the transition to `Closing`, runs cleanup, and lands in `Closed`;
    /// every later call returns immediately.
    pub async fn close(&self) {
        let won = [SessionState::Active, SessionState::Connecting]
            .iter()
            .any(|from| {
                self.state
                    .compare_exchange(
                        *from as u8,
                        SessionState::Closing as u8,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
            });
        if !won {
            return;
        }
        self.cancel.cancel();
        self.registry.remove(&self.conn.id).await;
        self.state.store(SessionState::Closed as u8, Ordering::SeqCst);
        counter!("pulse_sessions_closed_total").increment(1);
        info!(client_id = %self.conn.id, "session closed");
    }

    fn reply(&self, message: &ServerMessage) {
        if !self.conn.send_message(message) {
            warn!(client_id = %self.conn.id, "failed to deliver reply");
        }
    }
}
