//! The document store boundary.
//!
//! [`DocumentStore`] is the contract the rest of the crate programs against:
//! named collections of JSON documents with create/get/delete, an atomic
//! integer increment, and push-based subscriptions that deliver whole
//! snapshots. [`LocalStore`] is the in-process implementation;
//! [`SnippetCollection`] is the typed adapter for one snippet collection.

mod journal;
mod local;
mod snippets;

pub use journal::{Journal, JournalEntry, JournalOp};
pub use local::LocalStore;
pub use snippets::SnippetCollection;

use crate::error::Result;
use crate::subscriptions::{SubscriptionHandle, SubscriptionTarget};
use crate::types::{Document, DocumentId, Fields};

/// A document database with query subscriptions.
///
/// Implementations must be safe to share between threads; one instance is
/// constructed at application start and passed to every service.
pub trait DocumentStore: Send + Sync {
    /// Insert a document; the store assigns its id.
    fn create(&self, collection: &str, fields: Fields) -> Result<DocumentId>;

    /// Insert a document under a caller-chosen id unless one exists.
    /// Returns whether the document was inserted.
    fn insert_if_absent(&self, collection: &str, id: &DocumentId, fields: Fields) -> Result<bool>;

    /// Atomically add `by` to an integer field (a missing field counts as 0).
    fn increment(&self, collection: &str, id: &DocumentId, field: &str, by: i64) -> Result<()>;

    /// Remove a document. Removing a missing document succeeds.
    fn delete(&self, collection: &str, id: &DocumentId) -> Result<()>;

    /// Read a document, or `StoreError::NotFound`.
    fn get(&self, collection: &str, id: &DocumentId) -> Result<Document>;

    /// Number of documents in a collection.
    fn count(&self, collection: &str) -> Result<usize>;

    /// Subscribe to a query or a single document. The current state is
    /// delivered immediately, then every change.
    fn subscribe(&self, target: SubscriptionTarget) -> Result<SubscriptionHandle>;

    /// Stop serving: every subscription ends and later calls fail.
    fn close(&self);
}
