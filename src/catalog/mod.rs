//! Live snippet catalogs.
//!
//! A [`CatalogSynchronizer`] owns the single store subscription for one
//! collection and exposes the latest ordered [`Snapshot`]. Views derive
//! filtered results from it with [`SnippetFilter`]; nothing outside the
//! synchronizer mutates a snapshot.

mod filter;
mod sync;
mod view;

pub use filter::{filter, CategoryFilter, PluginFilter, SnippetFilter, ALL};
pub use sync::{CatalogConsumer, CatalogSynchronizer, CatalogUpdate, Snapshot, SyncState};
pub use view::CatalogView;
