//! Subscription types for live collection snapshots.

use crate::types::{Document, DocumentId, QuerySpec};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use super::manager::SubscriptionManager;

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 64
    pub buffer_size: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self { buffer_size: 64 }
    }
}

/// What a subscription watches.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SubscriptionTarget {
    /// Every change to the query's result set delivers the whole result set.
    Query(QuerySpec),
    /// Changes to a single document.
    Document { collection: String, id: DocumentId },
}

impl SubscriptionTarget {
    pub fn document(collection: impl Into<String>, id: DocumentId) -> Self {
        SubscriptionTarget::Document {
            collection: collection.into(),
            id,
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            SubscriptionTarget::Query(query) => &query.collection,
            SubscriptionTarget::Document { collection, .. } => collection,
        }
    }
}

/// Events emitted by subscriptions.
#[derive(Clone, Debug)]
pub enum StoreEvent {
    /// The complete, ordered result set of a query.
    Snapshot {
        collection: String,
        /// Collection version this snapshot represents.
        version: u64,
        documents: Arc<[Document]>,
    },

    /// Current contents of a watched document (None = absent).
    Document {
        collection: String,
        id: DocumentId,
        document: Option<Document>,
    },

    /// Subscription was dropped. Always the last event.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// The store was closed.
    Disconnected,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::BufferOverflow => f.write_str("buffer overflow"),
            DropReason::Disconnected => f.write_str("store disconnected"),
            DropReason::Unsubscribed => f.write_str("unsubscribed"),
        }
    }
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to a live subscription. Dropping it unsubscribes.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    target: SubscriptionTarget,
    receiver: Receiver<StoreEvent>,
    pub(super) dropped: Arc<Mutex<Option<DropReason>>>,
    pub(super) manager: Weak<SubscriptionManager>,
    terminated: AtomicBool,
}

impl SubscriptionHandle {
    pub(super) fn new(
        id: SubscriptionId,
        target: SubscriptionTarget,
        receiver: Receiver<StoreEvent>,
        dropped: Arc<Mutex<Option<DropReason>>>,
        manager: Weak<SubscriptionManager>,
    ) -> Self {
        Self {
            id,
            target,
            receiver,
            dropped,
            manager,
            terminated: AtomicBool::new(false),
        }
    }

    pub fn target(&self) -> &SubscriptionTarget {
        &self.target
    }

    /// Next pending event without blocking.
    ///
    /// Once the subscription has ended this yields exactly one
    /// [`StoreEvent::Dropped`], even if the buffer had no room for it, and
    /// `None` afterwards.
    pub fn next_event(&self) -> Option<StoreEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(self.observe(event)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.terminal_event(),
        }
    }

    /// Like [`next_event`](Self::next_event), waiting up to `timeout`.
    pub fn wait_event(&self, timeout: Duration) -> Option<StoreEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(self.observe(event)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => self.terminal_event(),
        }
    }

    /// Why the subscription ended, if it has.
    pub fn drop_reason(&self) -> Option<DropReason> {
        self.dropped.lock().clone()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn observe(&self, event: StoreEvent) -> StoreEvent {
        if matches!(event, StoreEvent::Dropped { .. }) {
            self.terminated.store(true, Ordering::SeqCst);
        }
        event
    }

    fn terminal_event(&self) -> Option<StoreEvent> {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return None;
        }
        let reason = self.drop_reason().unwrap_or(DropReason::Disconnected);
        Some(StoreEvent::Dropped { reason })
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.unsubscribe(self.id);
        }
    }
}
