//! Broadcast hub fanning tree updates out to live subscribers.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use mdtree_core::{HubMessage, SourceTree};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Messages a subscriber may have queued before it is considered dead.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// Identifies one subscriber for the lifetime of the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// The raw numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

/// Receiving half of a subscription.
///
/// The first message is always [`HubMessage::Connected`]. Dropping the
/// subscription is enough to leave the hub; the next publish notices the
/// closed channel and removes it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<HubMessage>>,
}

impl Subscription {
    /// Id to pass to [`BroadcastHub::unsubscribe`].
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next message. Returns `None` once the hub has dropped
    /// this subscriber.
    pub async fn recv(&mut self) -> Option<Arc<HubMessage>> {
        self.rx.recv().await
    }

    /// Take a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<HubMessage>> {
        self.rx.try_recv().ok()
    }

    /// Consume the subscription as a `Stream` of messages.
    pub fn into_stream(self) -> ReceiverStream<Arc<HubMessage>> {
        ReceiverStream::new(self.rx)
    }
}

/// Process-wide set of subscribers.
///
/// Cloning the hub yields another handle to the same subscriber set.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

#[derive(Debug)]
struct HubInner {
    subscribers: DashMap<SubscriberId, mpsc::Sender<Arc<HubMessage>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    /// Create a hub with [`DEFAULT_SUBSCRIBER_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Create a hub whose subscribers may lag by up to `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register a new subscriber and queue its `connected` greeting.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        // The greeting is queued before the sender becomes visible to
        // publishers, so it always arrives first. Capacity is at least one.
        let _ = tx.try_send(Arc::new(HubMessage::Connected));
        self.inner.subscribers.insert(id, tx);

        debug!(%id, total = self.inner.subscribers.len(), "Subscriber added");
        Subscription { id, rx }
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.inner.subscribers.remove(&id).is_some();
        if removed {
            debug!(%id, "Subscriber removed");
        }
        removed
    }

    /// Deliver `message` to every subscriber and return how many accepted it.
    ///
    /// Subscribers whose channel is closed or full are dropped from the set;
    /// the others are unaffected.
    pub fn publish(&self, message: HubMessage) -> usize {
        let message = Arc::new(message);
        let mut delivered = 0;
        let mut dead = Vec::new();

        for entry in self.inner.subscribers.iter() {
            match entry.value().try_send(Arc::clone(&message)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Closed(_)) => dead.push(*entry.key()),
                Err(TrySendError::Full(_)) => {
                    warn!(id = %entry.key(), "Subscriber is not keeping up, dropping it");
                    dead.push(*entry.key());
                }
            }
        }

        // Removal happens after iteration; DashMap shards stay read-locked
        // while iterating.
        for id in &dead {
            self.inner.subscribers.remove(id);
        }

        debug!(delivered, dropped = dead.len(), "Published update");
        delivered
    }

    /// Publish a `sources_updated` message carrying the tree's root.
    pub fn publish_tree(&self, tree: &SourceTree) -> usize {
        self.publish(HubMessage::SourcesUpdated {
            sources: Arc::clone(&tree.root),
        })
    }

    /// Number of registered subscribers, dead ones included until the next
    /// publish.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Check whether `id` is still registered.
    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.inner.subscribers.contains_key(&id)
    }
}
