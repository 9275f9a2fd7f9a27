//! Live, ordered in-memory copy of one snippet collection.

use crate::error::SubscriptionError;
use crate::snippet::{CollectionKind, Snippet};
use crate::store::SnippetCollection;
use crate::subscriptions::{StoreEvent, SubscriptionHandle};
use crate::types::{Document, DocumentId};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle of the synchronizer's subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// No consumers, no subscription.
    Unsubscribed,
    /// Subscription opened, first snapshot not yet applied.
    Subscribing,
    /// At least one snapshot applied; following the store.
    Live,
    /// Subscription failed; the last good snapshot is kept.
    Error,
}

/// An immutable, ordered (newest first) view of a collection.
#[derive(Debug, Default)]
pub struct Snapshot {
    version: u64,
    entries: Vec<Snippet>,
}

impl Snapshot {
    pub fn new(version: u64, entries: Vec<Snippet>) -> Self {
        Self { version, entries }
    }

    /// Collection version this snapshot was taken at.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entries(&self) -> &[Snippet] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snippet> {
        self.entries.iter()
    }

    pub fn get(&self, id: &DocumentId) -> Option<&Snippet> {
        self.entries.iter().find(|s| &s.id == id)
    }
}

/// Notification sent to every attached consumer.
#[derive(Clone, Debug)]
pub enum CatalogUpdate {
    Snapshot(Arc<Snapshot>),
    Failed(SubscriptionError),
}

/// One-deep mailbox: a newer update replaces an unread one.
struct UpdateSlot {
    sender: Sender<CatalogUpdate>,
    /// Producer-side receiver used to discard the unread update.
    pending: Receiver<CatalogUpdate>,
}

impl UpdateSlot {
    fn new() -> (Self, Receiver<CatalogUpdate>) {
        let (sender, receiver) = bounded(1);
        let slot = Self {
            sender,
            pending: receiver.clone(),
        };
        (slot, receiver)
    }

    fn post(&self, update: CatalogUpdate) {
        while self.pending.try_recv().is_ok() {}
        let _ = self.sender.try_send(update);
    }
}

struct Inner {
    state: SyncState,
    /// Shared so `pump_timeout` can wait without holding the lock.
    handle: Option<Arc<SubscriptionHandle>>,
    consumers: HashMap<u64, UpdateSlot>,
    snapshot: Arc<Snapshot>,
    error: Option<SubscriptionError>,
}

/// Keeps one live subscription per collection while anyone is attached.
///
/// State machine: `Unsubscribed -> Subscribing -> Live -> (Error | Unsubscribed)`.
/// The first [`attach`](Self::attach) subscribes; dropping the last
/// [`CatalogConsumer`] unsubscribes. Store events are applied by
/// [`pump`](Self::pump), so snapshots only change at pump boundaries and a
/// snapshot is always replaced whole.
pub struct CatalogSynchronizer {
    collection: SnippetCollection,
    inner: Mutex<Inner>,
    next_consumer: AtomicU64,
}

impl CatalogSynchronizer {
    pub fn new(collection: SnippetCollection) -> Self {
        Self {
            collection,
            inner: Mutex::new(Inner {
                state: SyncState::Unsubscribed,
                handle: None,
                consumers: HashMap::new(),
                snapshot: Arc::new(Snapshot::default()),
                error: None,
            }),
            next_consumer: AtomicU64::new(1),
        }
    }

    pub fn kind(&self) -> CollectionKind {
        self.collection.kind()
    }

    /// Register a consumer, subscribing if it is the first one.
    pub fn attach(self: &Arc<Self>) -> CatalogConsumer {
        let id = self.next_consumer.fetch_add(1, Ordering::SeqCst);
        let (slot, updates) = UpdateSlot::new();

        let mut inner = self.inner.lock();
        inner.consumers.insert(id, slot);
        if inner.state == SyncState::Unsubscribed {
            self.open(&mut inner);
        }
        debug!(collection = self.collection.name(), consumer = id, "consumer attached");

        CatalogConsumer {
            id,
            sync: Arc::clone(self),
            updates,
        }
    }

    fn detach(&self, id: u64) {
        let mut inner = self.inner.lock();
        if inner.consumers.remove(&id).is_none() {
            return;
        }
        debug!(collection = self.collection.name(), consumer = id, "consumer detached");

        if inner.consumers.is_empty() {
            inner.handle = None;
            inner.error = None;
            inner.state = SyncState::Unsubscribed;
            info!(collection = self.collection.name(), "catalog unsubscribed");
        }
    }

    /// Manually re-subscribe after an error. Returns the resulting state.
    pub fn resubscribe(&self) -> SyncState {
        let mut inner = self.inner.lock();
        if inner.state == SyncState::Error && !inner.consumers.is_empty() {
            info!(collection = self.collection.name(), "resubscribing");
            self.open(&mut inner);
        }
        inner.state
    }

    fn open(&self, inner: &mut Inner) {
        inner.state = SyncState::Subscribing;
        inner.error = None;
        match self.collection.subscribe() {
            Ok(handle) => {
                info!(collection = self.collection.name(), "catalog subscribing");
                inner.handle = Some(Arc::new(handle));
            }
            Err(e) => self.fail(
                inner,
                SubscriptionError::Subscribe {
                    collection: self.collection.name().to_string(),
                    message: e.to_string(),
                },
            ),
        }
    }

    /// Apply every pending store event without blocking.
    /// Returns the number of events consumed.
    pub fn pump(&self) -> usize {
        let mut inner = self.inner.lock();
        self.drain(&mut inner, None)
    }

    /// Wait up to `timeout` for a store event, then apply everything pending.
    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        let Some(handle) = self.inner.lock().handle.clone() else {
            return 0;
        };

        let first = handle.wait_event(timeout);

        let mut inner = self.inner.lock();
        let current = inner.handle.as_ref().is_some_and(|h| Arc::ptr_eq(h, &handle));
        if !current {
            // Detached or resubscribed while waiting: the event is stale.
            return 0;
        }
        self.drain(&mut inner, first)
    }

    fn drain(&self, inner: &mut Inner, first: Option<StoreEvent>) -> usize {
        let Some(handle) = inner.handle.clone() else {
            return 0;
        };

        let mut consumed = 0;
        let mut latest: Option<(u64, Arc<[Document]>)> = None;
        let mut terminal = None;

        let mut next = first.or_else(|| handle.next_event());
        while let Some(event) = next {
            consumed += 1;
            match event {
                StoreEvent::Snapshot {
                    version, documents, ..
                } => latest = Some((version, documents)),
                StoreEvent::Document { .. } => {}
                StoreEvent::Dropped { reason } => {
                    terminal = Some(reason);
                    break;
                }
            }
            next = handle.next_event();
        }

        // Latest snapshot wins
        if let Some((version, documents)) = latest {
            self.apply(inner, version, &documents);
        }

        if let Some(reason) = terminal {
            self.fail(
                inner,
                SubscriptionError::Dropped {
                    collection: self.collection.name().to_string(),
                    reason,
                },
            );
        }

        consumed
    }

    fn apply(&self, inner: &mut Inner, version: u64, documents: &[Document]) {
        let entries: Vec<Snippet> = documents
            .iter()
            .filter_map(|doc| match Snippet::from_document(doc) {
                Ok(snippet) => Some(snippet),
                Err(e) => {
                    warn!(collection = self.collection.name(), id = %doc.id, error = %e, "skipping undecodable snippet");
                    None
                }
            })
            .collect();

        let snapshot = Arc::new(Snapshot::new(version, entries));
        inner.snapshot = Arc::clone(&snapshot);
        if inner.state != SyncState::Live {
            info!(collection = self.collection.name(), "catalog live");
        }
        inner.state = SyncState::Live;
        debug!(collection = self.collection.name(), version, len = snapshot.len(), "snapshot applied");

        for slot in inner.consumers.values() {
            slot.post(CatalogUpdate::Snapshot(Arc::clone(&snapshot)));
        }
    }

    fn fail(&self, inner: &mut Inner, error: SubscriptionError) {
        warn!(collection = self.collection.name(), %error, "catalog subscription failed");
        inner.handle = None;
        inner.state = SyncState::Error;
        inner.error = Some(error.clone());
        for slot in inner.consumers.values() {
            slot.post(CatalogUpdate::Failed(error.clone()));
        }
    }

    /// The latest applied snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.inner.lock().snapshot)
    }

    pub fn state(&self) -> SyncState {
        self.inner.lock().state
    }

    /// The error that put the synchronizer in [`SyncState::Error`].
    pub fn last_error(&self) -> Option<SubscriptionError> {
        self.inner.lock().error.clone()
    }

    pub fn consumer_count(&self) -> usize {
        self.inner.lock().consumers.len()
    }
}

/// An attached consumer. Dropping it detaches.
pub struct CatalogConsumer {
    id: u64,
    sync: Arc<CatalogSynchronizer>,
    updates: Receiver<CatalogUpdate>,
}

impl CatalogConsumer {
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.sync.snapshot()
    }

    pub fn state(&self) -> SyncState {
        self.sync.state()
    }

    pub fn error(&self) -> Option<SubscriptionError> {
        self.sync.last_error()
    }

    /// The most recent unread notification for this consumer. Holds at
    /// most one update; an unread update is replaced by a newer one.
    pub fn updates(&self) -> &Receiver<CatalogUpdate> {
        &self.updates
    }

    pub fn synchronizer(&self) -> &Arc<CatalogSynchronizer> {
        &self.sync
    }
}

impl Drop for CatalogConsumer {
    fn drop(&mut self) {
        self.sync.detach(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snippet::{Category, SnippetInput};
    use crate::store::{DocumentStore, LocalStore};
    use crate::types::{Timestamp, SNIPPETS};
    use serde_json::json;

    fn setup() -> (Arc<LocalStore>, SnippetCollection, Arc<CatalogSynchronizer>) {
        let store = Arc::new(LocalStore::in_memory());
        let collection = SnippetCollection::new(store.clone(), CollectionKind::Snippets);
        let sync = Arc::new(CatalogSynchronizer::new(collection.clone()));
        (store, collection, sync)
    }

    fn input(title: &str, millis: i64) -> SnippetInput {
        SnippetInput {
            title: title.into(),
            description: "d".into(),
            code: "c".into(),
            language: "JavaScript".into(),
            category: Category::Case,
            plugin_type: None,
            author: "a".into(),
            date: Timestamp::from_millis(millis),
            watermark: None,
        }
    }

    #[test]
    fn test_state_machine() {
        let (store, collection, sync) = setup();
        collection.create(&input("Foo", 1)).unwrap();
        assert_eq!(sync.state(), SyncState::Unsubscribed);

        let consumer = sync.attach();
        assert_eq!(sync.state(), SyncState::Subscribing);
        assert!(consumer.snapshot().is_empty());

        assert_eq!(sync.pump(), 1);
        assert_eq!(sync.state(), SyncState::Live);
        assert_eq!(consumer.snapshot().len(), 1);

        drop(consumer);
        assert_eq!(sync.state(), SyncState::Unsubscribed);
        assert_eq!(store.stats().subscription_count, 0);
    }

    #[test]
    fn test_single_subscription_for_many_consumers() {
        let (store, _, sync) = setup();
        let a = sync.attach();
        let b = sync.attach();
        assert_eq!(store.stats().subscription_count, 1);
        assert_eq!(sync.consumer_count(), 2);

        drop(a);
        assert_eq!(sync.state(), SyncState::Subscribing);
        assert_eq!(store.stats().subscription_count, 1);

        drop(b);
        assert_eq!(store.stats().subscription_count, 0);
    }

    #[test]
    fn test_latest_snapshot_wins() {
        let (_, collection, sync) = setup();
        let consumer = sync.attach();
        sync.pump();

        collection.create(&input("a", 1)).unwrap();
        collection.create(&input("b", 2)).unwrap();
        collection.create(&input("c", 3)).unwrap();

        assert_eq!(sync.pump(), 3);
        let titles: Vec<_> = consumer.snapshot().iter().map(|s| s.title.clone()).collect();
        assert_eq!(titles, vec!["c", "b", "a"]);

        // Only the latest update is held
        let updates: Vec<_> = consumer.updates().try_iter().collect();
        assert_eq!(updates.len(), 1);
        match &updates[0] {
            CatalogUpdate::Snapshot(snapshot) => assert_eq!(snapshot.len(), 3),
            other => panic!("Expected snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_error_keeps_last_snapshot() {
        let (store, collection, sync) = setup();
        collection.create(&input("Foo", 1)).unwrap();
        let consumer = sync.attach();
        sync.pump();

        store.close();
        sync.pump();

        assert_eq!(sync.state(), SyncState::Error);
        assert_eq!(consumer.snapshot().len(), 1);
        assert!(matches!(
            consumer.error(),
            Some(SubscriptionError::Dropped { .. })
        ));
        assert!(consumer
            .updates()
            .try_iter()
            .any(|u| matches!(u, CatalogUpdate::Failed(_))));

        // Manual resubscribe against a closed store fails again
        assert_eq!(sync.resubscribe(), SyncState::Error);
        assert!(matches!(
            sync.last_error(),
            Some(SubscriptionError::Subscribe { .. })
        ));
    }

    #[test]
    fn test_resubscribe_recovers() {
        let store = Arc::new(LocalStore::open(crate::config::StoreConfig {
            subscription_buffer: 1,
            ..Default::default()
        })
        .unwrap());
        let collection = SnippetCollection::new(store.clone(), CollectionKind::Snippets);
        let sync = Arc::new(CatalogSynchronizer::new(collection.clone()));
        let _consumer = sync.attach();

        // Overflow the one-slot buffer
        collection.create(&input("a", 1)).unwrap();
        collection.create(&input("b", 2)).unwrap();
        sync.pump();
        assert_eq!(sync.state(), SyncState::Error);

        assert_eq!(sync.resubscribe(), SyncState::Subscribing);
        sync.pump();
        assert_eq!(sync.state(), SyncState::Live);
        assert_eq!(sync.snapshot().len(), 2);
    }

    #[test]
    fn test_undecodable_documents_are_skipped() {
        let (store, collection, sync) = setup();
        collection.create(&input("good", 1)).unwrap();
        store
            .create(SNIPPETS, json!({"date": "2024-01-01T00:00:00.000Z"}).as_object().cloned().unwrap())
            .unwrap();

        let _consumer = sync.attach();
        sync.pump();
        assert_eq!(sync.snapshot().len(), 1);
    }

    #[test]
    fn test_pump_timeout_waits_for_event() {
        let (_, collection, sync) = setup();
        let consumer = sync.attach();
        sync.pump();

        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            collection.create(&input("late", 1)).unwrap();
        });

        let consumed = sync.pump_timeout(Duration::from_secs(5));
        writer.join().unwrap();
        assert!(consumed >= 1);
        assert_eq!(consumer.snapshot().len(), 1);
    }

    #[test]
    fn test_no_delivery_after_detach() {
        let (_, collection, sync) = setup();
        let consumer = sync.attach();
        sync.pump();
        let updates = consumer.updates().clone();
        drop(consumer);

        collection.create(&input("after", 1)).unwrap();
        assert_eq!(sync.pump(), 0);
        assert_eq!(updates.try_iter().count(), 1); // only the initial snapshot
        assert!(sync.snapshot().is_empty());
    }

    #[test]
    fn test_pump_timeout_discards_events_of_replaced_subscription() {
        let (_, collection, sync) = setup();
        let first = sync.attach();
        sync.pump();

        let waiter = {
            let sync = Arc::clone(&sync);
            std::thread::spawn(move || sync.pump_timeout(Duration::from_secs(5)))
        };
        std::thread::sleep(Duration::from_millis(50));

        // Replace the subscription the waiter is blocked on
        drop(first);
        let second = sync.attach();
        collection.create(&input("while waiting", 1)).unwrap();

        assert_eq!(waiter.join().unwrap(), 0);
        assert_eq!(sync.state(), SyncState::Subscribing);
        assert!(second.updates().try_recv().is_err());
        assert!(sync.snapshot().is_empty());

        // Initial snapshot plus the write
        assert_eq!(sync.pump(), 2);
        assert_eq!(second.snapshot().len(), 1);
    }
}
