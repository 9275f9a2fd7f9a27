//! Page-view counter kept in a single store document.

use crate::error::{Result, StoreError, StoreOperation};
use crate::store::DocumentStore;
use crate::subscriptions::{StoreEvent, SubscriptionHandle, SubscriptionTarget};
use crate::types::{Document, DocumentId, Fields, TOTAL_VISITORS, VISITORS};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Field holding the count.
pub const COUNT_FIELD: &str = "count";

fn counter_id() -> DocumentId {
    DocumentId::new(TOTAL_VISITORS)
}

fn read_count(doc: &Document) -> u64 {
    doc.field(COUNT_FIELD)
        .and_then(|v| v.as_u64())
        .unwrap_or_default()
}

/// Records visits against `visitors/total_visitors`.
#[derive(Clone)]
pub struct VisitorCounter {
    store: Arc<dyn DocumentStore>,
}

impl VisitorCounter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Add one visit.
    ///
    /// The counter document is created on the first visit. Every later visit
    /// goes through the store's atomic increment, including a first visit
    /// that lost the create race to a concurrent caller.
    pub fn record_visit(&self) -> Result<()> {
        let id = counter_id();
        match self.store.get(VISITORS, &id) {
            Ok(_) => return self.store.increment(VISITORS, &id, COUNT_FIELD, 1),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let mut fields = Fields::new();
        fields.insert(COUNT_FIELD.to_string(), json!(1));
        if self.store.insert_if_absent(VISITORS, &id, fields)? {
            debug!("visitor counter created");
            return Ok(());
        }
        self.store.increment(VISITORS, &id, COUNT_FIELD, 1)
    }

    /// Current count; zero before the first visit.
    pub fn count(&self) -> Result<u64> {
        match self.store.get(VISITORS, &counter_id()) {
            Ok(doc) => Ok(read_count(&doc)),
            Err(e) if e.is_not_found() => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Live view of the count.
    pub fn watch(&self) -> Result<VisitorWatch> {
        let handle = self
            .store
            .subscribe(SubscriptionTarget::document(VISITORS, counter_id()))?;
        Ok(VisitorWatch {
            handle,
            latest: 0,
            ended: false,
        })
    }
}

/// Tracks the counter document through a subscription.
pub struct VisitorWatch {
    handle: SubscriptionHandle,
    latest: u64,
    ended: bool,
}

impl VisitorWatch {
    /// Drain pending events and return the latest known count.
    pub fn poll(&mut self) -> u64 {
        while let Some(event) = self.handle.next_event() {
            self.observe(event);
        }
        self.latest
    }

    /// Wait up to `timeout` for a change, then drain.
    pub fn poll_timeout(&mut self, timeout: Duration) -> u64 {
        if let Some(event) = self.handle.wait_event(timeout) {
            self.observe(event);
        }
        self.poll()
    }

    pub fn latest(&self) -> u64 {
        self.latest
    }

    /// Whether the subscription has ended; the last count is kept.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// The error that ended the subscription, if any.
    pub fn error(&self) -> Option<StoreError> {
        if !self.ended {
            return None;
        }
        self.handle.drop_reason().map(|reason| StoreError::Unavailable {
            operation: StoreOperation::Subscribe,
            reason: reason.to_string(),
        })
    }

    fn observe(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::Document { document, .. } => {
                self.latest = document.as_ref().map(read_count).unwrap_or_default();
            }
            StoreEvent::Dropped { reason } => {
                warn!(%reason, "visitor count subscription ended");
                self.ended = true;
            }
            StoreEvent::Snapshot { .. } => {}
        }
    }
}
