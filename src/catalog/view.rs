//! Filtered view over a live catalog.

use crate::snippet::Snippet;
use std::sync::Arc;

use super::filter::SnippetFilter;
use super::sync::{CatalogConsumer, Snapshot, SyncState};

/// A consumer plus filter parameters; the filtered result is recomputed
/// whenever the snapshot or the parameters change.
pub struct CatalogView {
    consumer: CatalogConsumer,
    filter: SnippetFilter,
    /// Snapshot and filter the cached result was computed from.
    computed_from: Option<(Arc<Snapshot>, SnippetFilter)>,
    results: Vec<Snippet>,
}

impl CatalogView {
    pub fn new(consumer: CatalogConsumer) -> Self {
        Self {
            consumer,
            filter: SnippetFilter::default(),
            computed_from: None,
            results: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: SnippetFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn filter(&self) -> &SnippetFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: SnippetFilter) {
        self.filter = filter;
    }

    /// Apply pending store events, then return the filtered snippets.
    ///
    /// The view reads the snapshot directly, so the pending notification is
    /// consumed here.
    pub fn refresh(&mut self) -> &[Snippet] {
        self.consumer.synchronizer().pump();
        while self.consumer.updates().try_recv().is_ok() {}
        self.results()
    }

    /// Filtered snippets for the current snapshot and parameters.
    pub fn results(&mut self) -> &[Snippet] {
        let snapshot = self.consumer.snapshot();
        let fresh = matches!(
            &self.computed_from,
            Some((s, f)) if Arc::ptr_eq(s, &snapshot) && f == &self.filter
        );
        if !fresh {
            self.results = self.filter.apply(snapshot.entries());
            self.computed_from = Some((snapshot, self.filter.clone()));
        }
        &self.results
    }

    pub fn state(&self) -> SyncState {
        self.consumer.state()
    }

    pub fn consumer(&self) -> &CatalogConsumer {
        &self.consumer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogSynchronizer;
    use crate::snippet::{Category, CollectionKind, PluginType, SnippetInput};
    use crate::store::{LocalStore, SnippetCollection};
    use crate::types::Timestamp;

    fn input(title: &str, category: Category, plugin_type: Option<PluginType>, millis: i64) -> SnippetInput {
        SnippetInput {
            title: title.into(),
            description: "d".into(),
            code: "c".into(),
            language: "JavaScript".into(),
            category,
            plugin_type,
            author: "a".into(),
            date: Timestamp::from_millis(millis),
            watermark: None,
        }
    }

    #[test]
    fn test_view_tracks_snapshot_and_filter() {
        let store = Arc::new(LocalStore::in_memory());
        let collection = SnippetCollection::new(store, CollectionKind::Snippets);
        let sync = Arc::new(CatalogSynchronizer::new(collection.clone()));

        collection.create(&input("Foo", Category::Case, None, 2)).unwrap();
        collection
            .create(&input("Bar", Category::Plugins, Some(PluginType::Esm), 1))
            .unwrap();

        let mut view = CatalogView::new(sync.attach());
        assert_eq!(view.refresh().len(), 2);

        view.set_filter(SnippetFilter::new().with_search("foo"));
        assert_eq!(view.results()[0].title, "Foo");
        assert_eq!(view.results().len(), 1);

        collection.create(&input("food", Category::Case, None, 3)).unwrap();
        let titles: Vec<_> = view.refresh().iter().map(|s| s.title.clone()).collect();
        assert_eq!(titles, vec!["food", "Foo"]);

        view.set_filter(SnippetFilter::new().with_category("PLUGINS").with_plugin_type("CJS"));
        assert!(view.results().is_empty());
    }

    #[test]
    fn test_refresh_releases_old_snapshots() {
        let store = Arc::new(LocalStore::in_memory());
        let collection = SnippetCollection::new(store, CollectionKind::Snippets);
        let sync = Arc::new(CatalogSynchronizer::new(collection.clone()));

        let mut view = CatalogView::new(sync.attach());
        view.refresh();
        let first = view.consumer().snapshot();

        for i in 0..500 {
            collection.create(&input(&format!("s{i}"), Category::Case, None, i)).unwrap();
            view.refresh();
        }

        assert_eq!(view.results().len(), 500);
        assert!(view.consumer().updates().len() <= 1);
        assert_eq!(Arc::strong_count(&first), 1);
    }

    #[test]
    fn test_unread_updates_are_replaced() {
        let store = Arc::new(LocalStore::in_memory());
        let collection = SnippetCollection::new(store, CollectionKind::Snippets);
        let sync = Arc::new(CatalogSynchronizer::new(collection.clone()));
        let consumer = sync.attach();

        for i in 0..500 {
            collection.create(&input(&format!("s{i}"), Category::Case, None, i)).unwrap();
            sync.pump();
        }

        assert_eq!(consumer.updates().len(), 1);
        match consumer.updates().try_recv() {
            Ok(crate::catalog::CatalogUpdate::Snapshot(snapshot)) => assert_eq!(snapshot.len(), 500),
            other => panic!("Expected latest snapshot, got {:?}", other),
        }
    }
}
