//! Subscription system for live collection snapshots.
//!
//! Each subscription watches either a query (and receives the whole ordered
//! result set on every change, never a diff) or a single document.
//!
//! Subscriptions support:
//! - Initial delivery of the current state on subscribe
//! - Bounded buffers with slow-subscriber dropping
//! - A single terminal `Dropped` event, after which nothing is delivered
//! - Unsubscribe on handle drop
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(SubscriptionTarget::Query(CollectionKind::Snippets.query()))?;
//!
//! while let Some(event) = handle.wait_event(Duration::from_secs(1)) {
//!     match event {
//!         StoreEvent::Snapshot { documents, .. } => println!("{} snippets", documents.len()),
//!         StoreEvent::Dropped { reason } => {
//!             println!("subscription ended: {reason}");
//!             break;
//!         }
//!         StoreEvent::Document { .. } => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, StoreEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionTarget,
};
