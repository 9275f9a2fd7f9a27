//! Subscription manager for broadcasting collection snapshots.

use crate::types::{Document, DocumentId, QuerySpec};
use crossbeam_channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::types::{
    DropReason, StoreEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionTarget,
};

/// Internal subscription state.
struct Subscription {
    target: SubscriptionTarget,
    sender: Sender<StoreEvent>,
    /// Shared with the handle so the reason survives a full buffer.
    dropped: Arc<Mutex<Option<DropReason>>>,
}

impl Subscription {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: StoreEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }

    fn query_on(&self, collection: &str) -> Option<&QuerySpec> {
        match &self.target {
            SubscriptionTarget::Query(query) if query.collection == collection => Some(query),
            _ => None,
        }
    }

    fn watches(&self, collection: &str, id: &DocumentId) -> bool {
        matches!(
            &self.target,
            SubscriptionTarget::Document { collection: c, id: i } if c == collection && i == id
        )
    }

    /// Record the reason and tell the subscriber (best effort; the handle
    /// falls back to the recorded reason once the sender is gone).
    fn close(self, reason: DropReason) {
        *self.dropped.lock() = Some(reason.clone());
        let _ = self.sender.try_send(StoreEvent::Dropped { reason });
    }
}

/// Manages subscriptions and broadcasts events.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription.
    ///
    /// The subscriber receives nothing until the owner delivers the initial
    /// state with [`send_to`](Self::send_to).
    pub fn subscribe(
        self: &Arc<Self>,
        target: SubscriptionTarget,
        config: SubscriptionConfig,
    ) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));
        let dropped = Arc::new(Mutex::new(None));

        let subscription = Subscription {
            target: target.clone(),
            sender,
            dropped: Arc::clone(&dropped),
        };

        self.subscriptions.write().insert(id, subscription);
        debug!(subscription = id.0, collection = target.collection(), "subscription opened");

        SubscriptionHandle::new(id, target, receiver, dropped, Arc::downgrade(self))
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let removed = self.subscriptions.write().remove(&id);
        if let Some(sub) = removed {
            debug!(subscription = id.0, "subscription closed");
            sub.close(DropReason::Unsubscribed);
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Send an event directly to one subscription (initial delivery).
    /// Returns false if the subscription was dropped.
    pub fn send_to(&self, id: SubscriptionId, event: StoreEvent) -> bool {
        let delivered = match self.subscriptions.read().get(&id) {
            Some(sub) => sub.try_send(event),
            None => return false,
        };
        if !delivered {
            self.remove(vec![id], DropReason::BufferOverflow);
        }
        delivered
    }

    // --- Broadcasting ---

    /// Broadcast a full snapshot to every query subscription on `collection`.
    ///
    /// `snapshot` is evaluated once per distinct query.
    pub fn broadcast_collection<F>(&self, collection: &str, version: u64, mut snapshot: F)
    where
        F: FnMut(&QuerySpec) -> Arc<[Document]>,
    {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            let mut computed: HashMap<&QuerySpec, Arc<[Document]>> = HashMap::new();

            for (id, sub) in subs.iter() {
                let Some(query) = sub.query_on(collection) else {
                    continue;
                };
                let documents = computed
                    .entry(query)
                    .or_insert_with(|| snapshot(query))
                    .clone();
                let event = StoreEvent::Snapshot {
                    collection: collection.to_string(),
                    version,
                    documents,
                };
                if !sub.try_send(event) {
                    to_remove.push(*id);
                }
            }
        }

        self.remove(to_remove, DropReason::BufferOverflow);
    }

    /// Broadcast the new contents of a document to its watchers.
    pub fn broadcast_document(&self, collection: &str, id: &DocumentId, document: Option<&Document>) {
        let event = StoreEvent::Document {
            collection: collection.to_string(),
            id: id.clone(),
            document: document.cloned(),
        };

        self.broadcast(|sub| sub.watches(collection, id), event);
    }

    /// Drop every subscription with the given reason.
    pub fn drop_all(&self, reason: DropReason) {
        let drained: Vec<_> = self.subscriptions.write().drain().collect();
        for (id, sub) in drained {
            debug!(subscription = id.0, %reason, "subscription dropped");
            sub.close(reason.clone());
        }
    }

    /// Internal broadcast helper. Drops subscribers that fail to receive.
    fn broadcast<F>(&self, filter: F, event: StoreEvent)
    where
        F: Fn(&Subscription) -> bool,
    {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if filter(sub) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        self.remove(to_remove, DropReason::BufferOverflow);
    }

    fn remove(&self, ids: Vec<SubscriptionId>, reason: DropReason) {
        if ids.is_empty() {
            return;
        }
        let mut subs = self.subscriptions.write();
        for id in ids {
            if let Some(sub) = subs.remove(&id) {
                debug!(subscription = id.0, %reason, "subscription dropped");
                sub.close(reason.clone());
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
