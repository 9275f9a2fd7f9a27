//! Typed adapter over one snippet collection.

use crate::error::Result;
use crate::snippet::{CollectionKind, Snippet, SnippetInput};
use crate::subscriptions::{SubscriptionHandle, SubscriptionTarget};
use crate::types::DocumentId;
use std::sync::Arc;

use super::DocumentStore;

/// Create/read/delete/subscribe against a named snippet collection.
#[derive(Clone)]
pub struct SnippetCollection {
    store: Arc<dyn DocumentStore>,
    kind: CollectionKind,
}

impl SnippetCollection {
    pub fn new(store: Arc<dyn DocumentStore>, kind: CollectionKind) -> Self {
        Self { store, kind }
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.collection()
    }

    /// Store a new snippet, returning its store-assigned id.
    pub fn create(&self, input: &SnippetInput) -> Result<DocumentId> {
        self.store.create(self.name(), input.to_fields()?)
    }

    pub fn delete(&self, id: &DocumentId) -> Result<()> {
        self.store.delete(self.name(), id)
    }

    pub fn get(&self, id: &DocumentId) -> Result<Snippet> {
        let document = self.store.get(self.name(), id)?;
        Snippet::from_document(&document)
    }

    pub fn count(&self) -> Result<usize> {
        self.store.count(self.name())
    }

    /// Subscribe to the collection, newest first. Every event carries the
    /// full ordered snapshot.
    pub fn subscribe(&self) -> Result<SubscriptionHandle> {
        self.store.subscribe(SubscriptionTarget::Query(self.kind.query()))
    }
}
