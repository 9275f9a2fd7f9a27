//! Application wiring: one store, one synchronizer per catalog, the visitor
//! counter and the admin workflow.

use crate::admin::{AdminSession, AdminWorkflow};
use crate::catalog::{CatalogConsumer, CatalogSynchronizer};
use crate::config::AppConfig;
use crate::error::{AdminError, Result, StoreError, StoreOperation};
use crate::snippet::{CollectionKind, Snippet};
use crate::store::{DocumentStore, LocalStore, SnippetCollection};
use crate::types::{DocumentId, SCRAPING_SNIPPETS, SNIPPETS, USERS};
use crate::views::DashboardStats;
use crate::visitors::VisitorCounter;
use std::sync::Arc;
use tracing::info;

pub struct App {
    config: AppConfig,
    store: Arc<dyn DocumentStore>,
    /// Set when the app opened its own store.
    local: Option<Arc<LocalStore>>,
    snippets: Arc<CatalogSynchronizer>,
    scraping: Arc<CatalogSynchronizer>,
    visitors: VisitorCounter,
    admin: AdminWorkflow,
}

impl App {
    /// Open the configured store and build the services on top of it.
    pub fn start(config: AppConfig) -> Result<Self> {
        let local = Arc::new(LocalStore::open(config.store.clone())?);
        let mut app = Self::with_store(local.clone(), config);
        app.local = Some(local);
        Ok(app)
    }

    /// Build the services on an existing store.
    pub fn with_store(store: Arc<dyn DocumentStore>, config: AppConfig) -> Self {
        let catalog = |kind| {
            Arc::new(CatalogSynchronizer::new(SnippetCollection::new(
                Arc::clone(&store),
                kind,
            )))
        };
        let snippets = catalog(CollectionKind::Snippets);
        let scraping = catalog(CollectionKind::Scraping);

        info!("app started");
        Self {
            config,
            visitors: VisitorCounter::new(Arc::clone(&store)),
            admin: AdminWorkflow::new(Arc::clone(&store)),
            store,
            local: None,
            snippets,
            scraping,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn catalog(&self, kind: CollectionKind) -> &Arc<CatalogSynchronizer> {
        match kind {
            CollectionKind::Snippets => &self.snippets,
            CollectionKind::Scraping => &self.scraping,
        }
    }

    /// Attach to a catalog and apply whatever the store has delivered.
    pub fn open_catalog(&self, kind: CollectionKind) -> CatalogConsumer {
        let consumer = self.catalog(kind).attach();
        consumer.synchronizer().pump();
        consumer
    }

    /// Look up one snippet for the detail view: the live snapshot first,
    /// then the store.
    pub fn snippet(&self, kind: CollectionKind, id: &DocumentId) -> Result<Snippet> {
        let consumer = self.open_catalog(kind);
        if let Some(snippet) = consumer.snapshot().get(id) {
            return Ok(snippet.clone());
        }
        SnippetCollection::new(Arc::clone(&self.store), kind).get(id)
    }

    pub fn visitors(&self) -> &VisitorCounter {
        &self.visitors
    }

    pub fn admin(&self) -> &AdminWorkflow {
        &self.admin
    }

    pub fn sign_in(&self, email: &str) -> std::result::Result<AdminSession, AdminError> {
        AdminSession::sign_in(email, &self.config.admin)
    }

    /// Real counts for the analytics tab.
    pub fn dashboard_stats(&self) -> Result<DashboardStats> {
        Ok(DashboardStats {
            snippets: self.store.count(SNIPPETS)?,
            scraping_snippets: self.store.count(SCRAPING_SNIPPETS)?,
            users: self.store.count(USERS)?,
            visitors: self.visitors.count()?,
        })
    }

    /// Rewrite the journal. Only available on a store the app opened itself.
    pub fn compact(&self) -> Result<()> {
        match &self.local {
            Some(local) => local.compact(),
            None => Err(StoreError::InvalidOperation {
                operation: StoreOperation::Compact,
                reason: "store does not support compaction".to_string(),
            }),
        }
    }

    /// Close the store; every live catalog moves to its error state on the
    /// next pump.
    pub fn stop(&self) {
        self.store.close();
        info!("app stopped");
    }
}
