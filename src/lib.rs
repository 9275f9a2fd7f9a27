//! # Codeshelf
//!
//! A code-snippet catalog kept live against a document store.
//!
//! ## Core Concepts
//!
//! - **Store**: named collections of JSON documents behind [`DocumentStore`],
//!   with push subscriptions that deliver whole ordered snapshots
//! - **Catalog**: a [`CatalogSynchronizer`] per collection holding the latest
//!   snapshot, shared by any number of consumers
//! - **Filter**: pure search / category / plugin-type filtering of a snapshot
//! - **Admin**: validated uploads and deletes that flow back through the
//!   subscription
//!
//! ## Example
//!
//! ```ignore
//! use codeshelf::{App, AppConfig, CollectionKind, SnippetFilter};
//!
//! let app = App::start(AppConfig::default())?;
//! let consumer = app.open_catalog(CollectionKind::Snippets);
//!
//! let filter = SnippetFilter::new().with_search("sticker").with_category("PLUGINS");
//! for snippet in filter.apply(consumer.snapshot().entries()) {
//!     println!("{}", snippet.title);
//! }
//! ```

pub mod admin;
pub mod app;
pub mod catalog;
pub mod config;
pub mod error;
pub mod snippet;
pub mod store;
pub mod subscriptions;
pub mod types;
pub mod views;
pub mod visitors;

// Re-exports
pub use admin::{AdminSession, AdminWorkflow, Notification, NotificationLevel, SnippetForm};
pub use app::App;
pub use catalog::{
    CatalogConsumer, CatalogSynchronizer, CatalogUpdate, CatalogView, CategoryFilter,
    PluginFilter, Snapshot, SnippetFilter, SyncState,
};
pub use config::{AdminConfig, AppConfig, StoreConfig};
pub use error::{
    AdminError, ConfigError, Result, StoreError, StoreOperation, SubscriptionError,
    ValidationError,
};
pub use snippet::{Category, CollectionKind, PluginType, Snippet, SnippetInput};
pub use store::{DocumentStore, LocalStore, SnippetCollection};
pub use subscriptions::{
    DropReason, StoreEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager, SubscriptionTarget,
};
pub use types::*;
pub use views::{format_compact, DashboardStats, SnippetRow};
pub use visitors::{VisitorCounter, VisitorWatch};
