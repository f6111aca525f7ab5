//! Client registry and topic subscription sets.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;
use tracing::debug;

use crate::connection::{ClientConnection, ClientId};

/// Both maps live under one lock so a `remove` purges the client and its
/// topic memberships in a single critical section. Nothing observes a state
/// where a removed client still sits in a topic set.
#[derive(Default)]
struct Inner {
    clients: HashMap<ClientId, Arc<ClientConnection>>,
    topics: HashMap<String, HashSet<ClientId>>,
}

/// Tracks connected clients and their topic subscriptions.
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<Inner>,
    /// Atomic count so liveness queries skip the lock.
    active: AtomicUsize,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Replacing an existing id keeps the count
    /// stable.
    pub async fn register(&self, connection: Arc<ClientConnection>) {
        let mut inner = self.inner.write().await;
        if inner
            .clients
            .insert(connection.id.clone(), connection)
            .is_none()
        {
            let _ = self.active.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a connection and purge it from every topic set. Idempotent:
    /// removing an unknown or already-removed id is a no-op.
    pub async fn remove(&self, client_id: &str) {
        let mut inner = self.inner.write().await;
        if inner.clients.remove(client_id).is_some() {
            let _ = self.active.fetch_sub(1, Ordering::Relaxed);
            for subscribers in inner.topics.values_mut() {
                let _ = subscribers.remove(client_id);
            }
            inner.topics.retain(|_, subscribers| !subscribers.is_empty());
            debug!(client_id, "client removed");
        }
    }

    /// Subscribe a registered client to a topic. Idempotent; unknown client
    /// ids are ignored (the client may have raced a disconnect).
    pub async fn subscribe(&self, client_id: &str, topic: &str) {
        let mut inner = self.inner.write().await;
        if !inner.clients.contains_key(client_id) {
            return;
        }
        let _ = inner
            .topics
            .entry(topic.to_owned())
            .or_default()
            .insert(client_id.to_owned());
    }

    /// Unsubscribe a client from a topic. Idempotent.
    pub async fn unsubscribe(&self, client_id: &str, topic: &str) {
        let mut inner = self.inner.write().await;
        if let Some(subscribers) = inner.topics.get_mut(topic) {
            let _ = subscribers.remove(client_id);
            if subscribers.is_empty() {
                let _ = inner.topics.remove(topic);
            }
        }
    }

    /// Point-in-time copy of a topic's subscribers.
    pub async fn subscribers_of(&self, topic: &str) -> Vec<Arc<ClientConnection>> {
        let inner = self.inner.read().await;
        inner
            .topics
            .get(topic)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.clients.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Point-in-time copy of all registered clients.
    pub async fn all_clients(&self) -> Vec<Arc<ClientConnection>> {
        self.inner.read().await.clients.values().cloned().collect()
    }

    /// Whether a client is currently subscribed to a topic.
    pub async fn is_subscribed(&self, client_id: &str, topic: &str) -> bool {
        self.inner
            .read()
            .await
            .topics
            .get(topic)
            .is_some_and(|ids| ids.contains(client_id))
    }

    /// Topics a client is currently subscribed to.
    pub async fn topics_of(&self, client_id: &str) -> Vec<String> {
        self.inner
            .read()
            .await
            .topics
            .iter()
            .filter(|(_, ids)| ids.contains(client_id))
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}
