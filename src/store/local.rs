//! In-process document store with an optional on-disk journal.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError, StoreOperation};
use crate::subscriptions::{
    DropReason, StoreEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionManager,
    SubscriptionTarget,
};
use crate::types::{Document, DocumentId, Fields, QuerySpec, StoreStats};
use fs2::FileExt;
use lru::LruCache;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::fs::{self, File};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::journal::{Journal, JournalEntry, JournalOp};
use super::DocumentStore;

/// Magic bytes for store manifest.
const STORE_MAGIC: &[u8; 4] = b"CSH\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// One named collection.
#[derive(Default)]
struct Collection {
    documents: HashMap<DocumentId, Document>,
    /// Next insertion sequence to assign.
    next_sequence: u64,
    /// Bumped on every change; identifies snapshots.
    version: u64,
}

impl Collection {
    fn insert(&mut self, document: Document) {
        self.next_sequence = self.next_sequence.max(document.sequence + 1);
        self.documents.insert(document.id.clone(), document);
        self.version += 1;
    }

    fn remove(&mut self, id: &DocumentId) -> Option<Document> {
        let removed = self.documents.remove(id);
        if removed.is_some() {
            self.version += 1;
        }
        removed
    }

    fn increment(&mut self, id: &DocumentId, field: &str, by: i64) -> std::result::Result<(), String> {
        let document = self
            .documents
            .get_mut(id)
            .ok_or_else(|| format!("document {id} missing"))?;
        let current = match document.fields.get(field) {
            None => 0,
            Some(value) => value
                .as_i64()
                .ok_or_else(|| format!("field {field} is not an integer"))?,
        };
        document
            .fields
            .insert(field.to_string(), serde_json::Value::from(current + by));
        self.version += 1;
        Ok(())
    }
}

/// The in-process document store.
///
/// Every mutation is journaled (when durable), applied, and then broadcast to
/// subscribers while the write lock is still held, so subscribers observe
/// mutations in commit order.
pub struct LocalStore {
    config: StoreConfig,

    /// Lock file for exclusive access (durable stores only).
    _lock_file: Option<File>,

    journal: Option<Journal>,

    collections: RwLock<HashMap<String, Collection>>,

    subscriptions: Arc<SubscriptionManager>,

    /// Ordered query results keyed by (query, collection version).
    snapshot_cache: Mutex<LruCache<(QuerySpec, u64), Arc<[Document]>>>,

    /// Serializes mutations and subscription setup.
    write_lock: Mutex<()>,

    /// Counter feeding id generation.
    next_id: AtomicU64,

    closed: AtomicBool,
}

impl LocalStore {
    /// Open the store described by `config`.
    pub fn open(config: StoreConfig) -> Result<Self> {
        match config.path.clone() {
            None => Ok(Self::build(config, None, None, Vec::new())),
            Some(path) if path.join("MANIFEST").exists() => Self::open_existing(config, &path),
            Some(path) if config.create_if_missing => Self::create(config, &path),
            Some(_) => Err(StoreError::NotInitialized),
        }
    }

    /// A store that lives only in memory.
    pub fn in_memory() -> Self {
        Self::build(StoreConfig::default(), None, None, Vec::new())
    }

    fn create(config: StoreConfig, path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;
        Self::write_manifest(path)?;
        let lock_file = Self::acquire_lock(path)?;
        let (journal, entries) = Journal::open(path.join("journal.log"), config.sync_every_write)?;

        info!(path = %path.display(), "store created");
        Ok(Self::build(config, Some(lock_file), Some(journal), entries))
    }

    fn open_existing(config: StoreConfig, path: &Path) -> Result<Self> {
        Self::verify_manifest(path)?;
        let lock_file = Self::acquire_lock(path)?;
        let (journal, entries) = Journal::open(path.join("journal.log"), config.sync_every_write)?;

        info!(path = %path.display(), entries = entries.len(), "store opened");
        Ok(Self::build(config, Some(lock_file), Some(journal), entries))
    }

    fn build(
        config: StoreConfig,
        lock_file: Option<File>,
        journal: Option<Journal>,
        entries: Vec<JournalEntry>,
    ) -> Self {
        let cache_size = NonZeroUsize::new(config.snapshot_cache_size).unwrap_or(NonZeroUsize::MIN);

        let mut collections: HashMap<String, Collection> = HashMap::new();
        for entry in entries {
            Self::replay(&mut collections, entry.op);
        }

        Self {
            config,
            _lock_file: lock_file,
            journal,
            collections: RwLock::new(collections),
            subscriptions: Arc::new(SubscriptionManager::new()),
            snapshot_cache: Mutex::new(LruCache::new(cache_size)),
            write_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Apply a journaled operation during open. Inconsistent entries are skipped.
    fn replay(collections: &mut HashMap<String, Collection>, op: JournalOp) {
        match op {
            JournalOp::Put {
                collection,
                id,
                sequence,
                fields,
            } => match serde_json::from_slice::<Fields>(&fields) {
                Ok(fields) => collections.entry(collection).or_default().insert(Document {
                    id,
                    sequence,
                    fields,
                }),
                Err(e) => warn!(%collection, %id, error = %e, "skipping undecodable journal put"),
            },
            JournalOp::Delete { collection, id } => {
                if let Some(coll) = collections.get_mut(&collection) {
                    coll.remove(&id);
                }
            }
            JournalOp::Increment {
                collection,
                id,
                field,
                by,
            } => match collections.get_mut(&collection) {
                Some(coll) => {
                    if let Err(reason) = coll.increment(&id, &field, by) {
                        warn!(%collection, %id, %reason, "skipping journal increment");
                    }
                }
                None => warn!(%collection, %id, "skipping increment on missing collection"),
            },
        }
    }

    // --- Guards ---

    fn check_open(&self, operation: StoreOperation) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                operation,
                reason: "store is closed".into(),
            });
        }
        Ok(())
    }

    fn check_writable(&self, collection: &str, operation: StoreOperation) -> Result<()> {
        self.check_open(operation)?;
        if self.config.read_only_collections.iter().any(|c| c == collection) {
            return Err(StoreError::PermissionDenied {
                operation,
                collection: collection.to_string(),
            });
        }
        Ok(())
    }

    /// Take the write lock, failing if the store closed while waiting for it.
    fn write_guard(&self, operation: StoreOperation) -> Result<MutexGuard<'_, ()>> {
        let guard = self.write_lock.lock();
        self.check_open(operation)?;
        Ok(guard)
    }

    fn log(&self, operation: StoreOperation, op: JournalOp) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.append(op).map_err(|e| StoreError::Unavailable {
                operation,
                reason: format!("journal append failed: {e}"),
            })?;
        }
        Ok(())
    }

    // --- Snapshots ---

    fn query_snapshot(&self, query: &QuerySpec, collection: Option<&Collection>) -> (u64, Arc<[Document]>) {
        let Some(collection) = collection else {
            return (0, Arc::from(Vec::new()));
        };

        let key = (query.clone(), collection.version);
        let mut cache = self.snapshot_cache.lock();
        if let Some(cached) = cache.get(&key) {
            return (collection.version, Arc::clone(cached));
        }

        let documents: Arc<[Document]> = Arc::from(query.apply(collection.documents.values()));
        cache.put(key, Arc::clone(&documents));
        (collection.version, documents)
    }

    /// Broadcast the state of `collection` after a change to `changed`.
    /// Caller holds the write lock.
    fn publish(&self, collection: &str, changed: &DocumentId) {
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return;
        };

        self.subscriptions
            .broadcast_collection(collection, coll.version, |query| {
                self.query_snapshot(query, Some(coll)).1
            });
        self.subscriptions
            .broadcast_document(collection, changed, coll.documents.get(changed));
    }

    // --- Maintenance ---

    /// Rewrite the journal so it holds exactly the live documents.
    pub fn compact(&self) -> Result<()> {
        self.check_open(StoreOperation::Compact)?;
        let Some(journal) = &self.journal else {
            return Ok(());
        };

        let _lock = self.write_guard(StoreOperation::Compact)?;
        let collections = self.collections.read();

        let mut ops = Vec::new();
        let mut names: Vec<&String> = collections.keys().collect();
        names.sort();
        for name in names {
            let mut documents: Vec<&Document> = collections[name].documents.values().collect();
            documents.sort_by_key(|d| d.sequence);
            for document in documents {
                ops.push(JournalOp::Put {
                    collection: name.clone(),
                    id: document.id.clone(),
                    sequence: document.sequence,
                    fields: encode_fields(StoreOperation::Compact, &document.fields)?,
                });
            }
        }

        let before = journal.len();
        journal.rewrite(ops).map_err(|e| StoreError::Unavailable {
            operation: StoreOperation::Compact,
            reason: format!("journal rewrite failed: {e}"),
        })?;
        info!(before, after = journal.len(), "journal compacted");
        Ok(())
    }

    /// Force sync the journal to disk.
    pub fn sync(&self) -> Result<()> {
        match &self.journal {
            Some(journal) => journal.sync(),
            None => Ok(()),
        }
    }

    pub fn stats(&self) -> StoreStats {
        let collections = self.collections.read();
        StoreStats {
            collection_count: collections.len(),
            document_count: collections.values().map(|c| c.documents.len()).sum(),
            subscription_count: self.subscriptions.subscription_count(),
            journal_entries: self.journal.as_ref().map(|j| j.len()).unwrap_or(0),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn path(&self) -> Option<&Path> {
        self.config.path.as_deref()
    }

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::create(manifest_path)?;

        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

fn encode_fields(operation: StoreOperation, fields: &Fields) -> Result<Vec<u8>> {
    serde_json::to_vec(fields).map_err(|e| StoreError::InvalidOperation {
        operation,
        reason: format!("fields not encodable: {e}"),
    })
}

impl DocumentStore for LocalStore {
    fn create(&self, collection: &str, fields: Fields) -> Result<DocumentId> {
        self.check_writable(collection, StoreOperation::Create)?;
        let _lock = self.write_guard(StoreOperation::Create)?;

        let (id, sequence) = {
            let collections = self.collections.read();
            let existing = collections.get(collection);
            let mut id = DocumentId::generate(collection, self.next_id.fetch_add(1, Ordering::SeqCst));
            while existing.is_some_and(|c| c.documents.contains_key(&id)) {
                id = DocumentId::generate(collection, self.next_id.fetch_add(1, Ordering::SeqCst));
            }
            (id, existing.map(|c| c.next_sequence).unwrap_or(0))
        };

        self.log(StoreOperation::Create, JournalOp::Put {
            collection: collection.to_string(),
            id: id.clone(),
            sequence,
            fields: encode_fields(StoreOperation::Create, &fields)?,
        })?;

        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(Document {
                id: id.clone(),
                sequence,
                fields,
            });

        debug!(%collection, %id, "document created");
        self.publish(collection, &id);
        Ok(id)
    }

    fn insert_if_absent(&self, collection: &str, id: &DocumentId, fields: Fields) -> Result<bool> {
        self.check_writable(collection, StoreOperation::Create)?;
        let _lock = self.write_guard(StoreOperation::Create)?;

        let sequence = {
            let collections = self.collections.read();
            match collections.get(collection) {
                Some(c) if c.documents.contains_key(id) => return Ok(false),
                Some(c) => c.next_sequence,
                None => 0,
            }
        };

        self.log(StoreOperation::Create, JournalOp::Put {
            collection: collection.to_string(),
            id: id.clone(),
            sequence,
            fields: encode_fields(StoreOperation::Create, &fields)?,
        })?;

        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(Document {
                id: id.clone(),
                sequence,
                fields,
            });

        debug!(%collection, %id, "document inserted");
        self.publish(collection, id);
        Ok(true)
    }

    fn increment(&self, collection: &str, id: &DocumentId, field: &str, by: i64) -> Result<()> {
        self.check_writable(collection, StoreOperation::Increment)?;
        let _lock = self.write_guard(StoreOperation::Increment)?;

        {
            let collections = self.collections.read();
            let document = collections
                .get(collection)
                .and_then(|c| c.documents.get(id))
                .ok_or_else(|| StoreError::NotFound {
                    operation: StoreOperation::Increment,
                    collection: collection.to_string(),
                    id: id.clone(),
                })?;
            if document.fields.get(field).is_some_and(|v| v.as_i64().is_none()) {
                return Err(StoreError::InvalidOperation {
                    operation: StoreOperation::Increment,
                    reason: format!("field {field} is not an integer"),
                });
            }
        }

        self.log(StoreOperation::Increment, JournalOp::Increment {
            collection: collection.to_string(),
            id: id.clone(),
            field: field.to_string(),
            by,
        })?;

        self.collections
            .write()
            .get_mut(collection)
            .map(|c| c.increment(id, field, by))
            .transpose()
            .map_err(|reason| StoreError::InvalidOperation {
                operation: StoreOperation::Increment,
                reason,
            })?;

        self.publish(collection, id);
        Ok(())
    }

    fn delete(&self, collection: &str, id: &DocumentId) -> Result<()> {
        self.check_writable(collection, StoreOperation::Delete)?;
        let _lock = self.write_guard(StoreOperation::Delete)?;

        let exists = self
            .collections
            .read()
            .get(collection)
            .is_some_and(|c| c.documents.contains_key(id));
        if !exists {
            debug!(%collection, %id, "delete of missing document ignored");
            return Ok(());
        }

        self.log(StoreOperation::Delete, JournalOp::Delete {
            collection: collection.to_string(),
            id: id.clone(),
        })?;

        if let Some(coll) = self.collections.write().get_mut(collection) {
            coll.remove(id);
        }

        debug!(%collection, %id, "document deleted");
        self.publish(collection, id);
        Ok(())
    }

    fn get(&self, collection: &str, id: &DocumentId) -> Result<Document> {
        self.check_open(StoreOperation::Get)?;
        self.collections
            .read()
            .get(collection)
            .and_then(|c| c.documents.get(id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                operation: StoreOperation::Get,
                collection: collection.to_string(),
                id: id.clone(),
            })
    }

    fn count(&self, collection: &str) -> Result<usize> {
        self.check_open(StoreOperation::Count)?;
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| c.documents.len())
            .unwrap_or(0))
    }

    fn subscribe(&self, target: SubscriptionTarget) -> Result<SubscriptionHandle> {
        self.check_open(StoreOperation::Subscribe)?;
        let _lock = self.write_guard(StoreOperation::Subscribe)?;

        let config = SubscriptionConfig {
            buffer_size: self.config.subscription_buffer,
        };
        let handle = self.subscriptions.subscribe(target.clone(), config);

        let initial = {
            let collections = self.collections.read();
            match &target {
                SubscriptionTarget::Query(query) => {
                    let (version, documents) =
                        self.query_snapshot(query, collections.get(&query.collection));
                    StoreEvent::Snapshot {
                        collection: query.collection.clone(),
                        version,
                        documents,
                    }
                }
                SubscriptionTarget::Document { collection, id } => StoreEvent::Document {
                    collection: collection.clone(),
                    id: id.clone(),
                    document: collections
                        .get(collection)
                        .and_then(|c| c.documents.get(id))
                        .cloned(),
                },
            }
        };
        self.subscriptions.send_to(handle.id, initial);

        Ok(handle)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _lock = self.write_lock.lock();
        self.subscriptions.drop_all(DropReason::Disconnected);
        if let Err(e) = self.sync() {
            warn!(error = %e, "journal sync on close failed");
        }
        info!("store closed");
    }
}

impl Drop for LocalStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderBy, SNIPPETS, VISITORS};
    use serde_json::json;
    use tempfile::TempDir;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn by_date() -> SubscriptionTarget {
        SubscriptionTarget::Query(QuerySpec::ordered(SNIPPETS, OrderBy::desc("date")))
    }

    fn titles(event: StoreEvent) -> Vec<String> {
        match event {
            StoreEvent::Snapshot { documents, .. } => documents
                .iter()
                .map(|d| d.fields["title"].as_str().unwrap_or_default().to_string())
                .collect(),
            other => panic!("Expected Snapshot event, got {:?}", other),
        }
    }

    #[test]
    fn test_create_get_delete() {
        let store = LocalStore::in_memory();

        let id = store.create(SNIPPETS, fields(json!({"title": "a"}))).unwrap();
        assert_eq!(store.get(SNIPPETS, &id).unwrap().fields["title"], json!("a"));
        assert_eq!(store.count(SNIPPETS).unwrap(), 1);

        store.delete(SNIPPETS, &id).unwrap();
        let err = store.get(SNIPPETS, &id).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.operation(), Some(StoreOperation::Get));

        // Deleting again is a no-op
        store.delete(SNIPPETS, &id).unwrap();
    }

    #[test]
    fn test_subscribe_delivers_initial_and_live_snapshots() {
        let store = LocalStore::in_memory();
        store
            .create(SNIPPETS, fields(json!({"title": "old", "date": "2024-01-01T00:00:00.000Z"})))
            .unwrap();

        let handle = store.subscribe(by_date()).unwrap();
        assert_eq!(titles(handle.next_event().unwrap()), vec!["old"]);

        store
            .create(SNIPPETS, fields(json!({"title": "new", "date": "2024-02-01T00:00:00.000Z"})))
            .unwrap();
        assert_eq!(titles(handle.next_event().unwrap()), vec!["new", "old"]);
        assert!(handle.next_event().is_none());
    }

    #[test]
    fn test_increment() {
        let store = LocalStore::in_memory();
        let id = DocumentId::new("total_visitors");

        let err = store.increment(VISITORS, &id, "count", 1).unwrap_err();
        assert!(err.is_not_found());

        assert!(store.insert_if_absent(VISITORS, &id, fields(json!({"count": 1}))).unwrap());
        assert!(!store.insert_if_absent(VISITORS, &id, fields(json!({"count": 1}))).unwrap());
        store.increment(VISITORS, &id, "count", 2).unwrap();
        assert_eq!(store.get(VISITORS, &id).unwrap().fields["count"], json!(3));

        store.increment(VISITORS, &id, "other", 5).unwrap();
        assert_eq!(store.get(VISITORS, &id).unwrap().fields["other"], json!(5));
    }

    #[test]
    fn test_increment_non_integer() {
        let store = LocalStore::in_memory();
        let id = DocumentId::new("x");
        store.insert_if_absent(VISITORS, &id, fields(json!({"count": "many"}))).unwrap();

        assert!(matches!(
            store.increment(VISITORS, &id, "count", 1),
            Err(StoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_read_only_collection() {
        let store = LocalStore::open(StoreConfig {
            read_only_collections: vec![SNIPPETS.to_string()],
            ..Default::default()
        })
        .unwrap();

        let err = store.create(SNIPPETS, Fields::new()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::PermissionDenied {
                operation: StoreOperation::Create,
                ..
            }
        ));
    }

    #[test]
    fn test_close_drops_subscriptions() {
        let store = LocalStore::in_memory();
        let handle = store.subscribe(by_date()).unwrap();
        handle.next_event();

        store.close();
        assert!(matches!(
            handle.next_event(),
            Some(StoreEvent::Dropped {
                reason: DropReason::Disconnected
            })
        ));
        assert!(matches!(
            store.create(SNIPPETS, Fields::new()),
            Err(StoreError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_durable_reopen_preserves_order() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::at(dir.path().join("store"));

        let (first, second) = {
            let store = LocalStore::open(config.clone()).unwrap();
            let a = store
                .create(SNIPPETS, fields(json!({"title": "a", "date": "2024-01-01T00:00:00.000Z"})))
                .unwrap();
            let b = store
                .create(SNIPPETS, fields(json!({"title": "b", "date": "2024-01-01T00:00:00.000Z"})))
                .unwrap();
            (a, b)
        };

        let store = LocalStore::open(config).unwrap();
        assert_eq!(store.get(SNIPPETS, &first).unwrap().sequence, 0);
        assert_eq!(store.get(SNIPPETS, &second).unwrap().sequence, 1);

        // Equal dates fall back to insertion order
        let handle = store.subscribe(by_date()).unwrap();
        assert_eq!(titles(handle.next_event().unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::at(dir.path().join("store"));

        let _store = LocalStore::open(config.clone()).unwrap();
        assert!(matches!(LocalStore::open(config), Err(StoreError::Locked)));
    }

    #[test]
    fn test_missing_store_without_create() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            create_if_missing: false,
            ..StoreConfig::at(dir.path().join("absent"))
        };
        assert!(matches!(LocalStore::open(config), Err(StoreError::NotInitialized)));
    }

    #[test]
    fn test_compact() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::at(dir.path().join("store"));

        {
            let store = LocalStore::open(config.clone()).unwrap();
            let mut ids = Vec::new();
            for i in 0..10 {
                ids.push(store.create(SNIPPETS, fields(json!({"title": i}))).unwrap());
            }
            for id in &ids[..8] {
                store.delete(SNIPPETS, id).unwrap();
            }
            assert_eq!(store.stats().journal_entries, 18);

            store.compact().unwrap();
            assert_eq!(store.stats().journal_entries, 2);
        }

        let store = LocalStore::open(config).unwrap();
        assert_eq!(store.count(SNIPPETS).unwrap(), 2);

        // New documents continue after the highest surviving sequence
        let id = store.create(SNIPPETS, Fields::new()).unwrap();
        assert_eq!(store.get(SNIPPETS, &id).unwrap().sequence, 10);
    }

    #[test]
    fn test_failed_journal_write_reports_operation() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::at(dir.path().join("store"));

        {
            let store = LocalStore::open(config.clone()).unwrap();
            store.journal.as_ref().unwrap().reopen_read_only().unwrap();

            let err = store.create(SNIPPETS, fields(json!({"title": "lost"}))).unwrap_err();
            assert!(matches!(err, StoreError::Unavailable { .. }));
            assert_eq!(err.operation(), Some(StoreOperation::Create));
            assert_eq!(store.count(SNIPPETS).unwrap(), 0);

            store.create(SNIPPETS, fields(json!({"title": "kept"}))).unwrap();
        }

        let store = LocalStore::open(config).unwrap();
        assert_eq!(store.count(SNIPPETS).unwrap(), 1);
    }

    #[test]
    fn test_writes_queued_behind_close_are_rejected() {
        let store = Arc::new(LocalStore::in_memory());
        let held = store.write_lock.lock();

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.create(SNIPPETS, fields(json!({"title": "late"}))))
        };
        let subscriber = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.subscribe(by_date()).is_ok())
        };
        std::thread::sleep(std::time::Duration::from_millis(50));

        let closer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.close())
        };
        while !store.is_closed() {
            std::thread::yield_now();
        }
        drop(held);
        closer.join().unwrap();

        let err = writer.join().unwrap().unwrap_err();
        assert_eq!(err.operation(), Some(StoreOperation::Create));
        assert!(matches!(err, StoreError::Unavailable { .. }));
        assert!(!subscriber.join().unwrap());
        assert_eq!(store.stats().subscription_count, 0);
    }
}
