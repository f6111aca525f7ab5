//! Message fan-out to subscribed clients.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use pulse_core::{BrokerConfig, ServerMessage};

use crate::connection::ClientConnection;
use crate::subscriptions::SubscriptionRegistry;

/// Default lifetime drop budget before a slow client is disconnected.
pub const DEFAULT_MAX_DROPS: u64 = 100;

/// Delivers messages to one topic's subscribers or to every client.
///
/// Delivery is best-effort, at-most-once per live client per publish call.
/// Each client is attempted independently: a full or closed channel never
/// delays the rest of the batch. Dead clients (closed channel) and clients
/// that exhaust their drop budget are removed from the registry.
pub struct BroadcastHub {
    registry: Arc<SubscriptionRegistry>,
    max_drops: u64,
}

impl BroadcastHub {
    /// Create a hub over a subscription registry.
    #[must_use]
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            registry,
            max_drops: DEFAULT_MAX_DROPS,
        }
    }

    /// Create a hub with the drop budget taken from configuration.
    #[must_use]
    pub fn from_config(registry: Arc<SubscriptionRegistry>, config: &BrokerConfig) -> Self {
        Self {
            registry,
            max_drops: config.max_client_drops,
        }
    }

    /// Override the per-client drop budget.
    #[must_use]
    pub fn with_max_drops(mut self, max_drops: u64) -> Self {
        self.max_drops = max_drops;
        self
    }

    /// Publish a message to a topic's subscribers, or to all clients when
    /// `topic` is `None`. Returns the number of successful deliveries.
    ///
    /// The recipient set is the subscriber snapshot at call time; racing
    /// subscribe/unsubscribe calls take effect for later publishes only.
    ///
    /// A slow but live client sheds frames silently: each failed send burns
    /// one unit of its lifetime drop budget (`max_drops`, default
    /// [`DEFAULT_MAX_DROPS`]) and the client is only removed once the budget
    /// is exhausted. Frames dropped before that point are not redelivered.
    pub async fn publish(&self, message: &ServerMessage, topic: Option<&str>) -> usize {
        let frame = match serde_json::to_string(message) {
            Ok(json) => Arc::new(json),
            Err(e) => {
                warn!(error = %e, "failed to serialize broadcast message");
                return 0;
            }
        };

        let recipients = match topic {
            Some(t) => self.registry.subscribers_of(t).await,
            None => self.registry.all_clients().await,
        };

        let mut delivered = 0usize;
        let mut to_remove: Vec<String> = Vec::new();
        for conn in &recipients {
            if conn.send(Arc::clone(&frame)) {
                delivered += 1;
                continue;
            }
            counter!("pulse_broadcast_drops_total").increment(1);
            if self.stale(conn) {
                warn!(conn_id = %conn.id, drops = conn.drop_count(), "removing stale client");
                to_remove.push(conn.id.clone());
            } else {
                warn!(
                    conn_id = %conn.id,
                    total_drops = conn.drop_count(),
                    "dropped frame for slow client (channel full)"
                );
            }
        }
        debug!(
            topic = topic.unwrap_or("<all>"),
            recipients = recipients.len(),
            delivered,
            "published message"
        );

        for id in &to_remove {
            self.registry.remove(id).await;
        }
        delivered
    }

    /// A client is stale when its channel is closed (peer gone) or it has
    /// burned through its lifetime drop budget (persistently slow).
    fn stale(&self, conn: &ClientConnection) -> bool {
        conn.is_closed() || conn.drop_count() >= self.max_drops
    }
}
