//! Performance benchmarks for catalog filtering and snapshot delivery.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use codeshelf::{
    Category, CatalogSynchronizer, CollectionKind, DocumentId, LocalStore, PluginType, Snippet,
    SnippetCollection, SnippetFilter, SnippetInput, StoreConfig, Timestamp, VisitorCounter,
};
use std::sync::Arc;
use tempfile::TempDir;

fn snippet(i: usize) -> Snippet {
    let category = if i % 2 == 0 { Category::Plugins } else { Category::Case };
    let plugin_type = category
        .is_plugin()
        .then(|| if i % 4 == 0 { PluginType::Esm } else { PluginType::Cjs });
    Snippet {
        id: DocumentId::new(format!("id-{i}")),
        title: format!("Snippet number {i} for stickers"),
        description: "benchmark".to_string(),
        code: "module.exports = () => 1".to_string(),
        language: "JavaScript".to_string(),
        category,
        plugin_type,
        author: "admin@example.com".to_string(),
        date: Timestamp::from_millis(i as i64),
        watermark: None,
    }
}

fn input(i: usize) -> SnippetInput {
    let s = snippet(i);
    SnippetInput {
        title: s.title,
        description: s.description,
        code: s.code,
        language: s.language,
        category: s.category,
        plugin_type: s.plugin_type,
        author: s.author,
        date: s.date,
        watermark: s.watermark,
    }
}

/// Benchmark filtering snapshots of varying size
fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");

    for size in [100, 1_000, 10_000] {
        let snapshot: Vec<Snippet> = (0..size).map(snippet).collect();
        let filter = SnippetFilter::new()
            .with_search("STICKERS")
            .with_category("PLUGINS")
            .with_plugin_type("CJS");

        group.bench_with_input(BenchmarkId::new("snapshot_size", size), &snapshot, |b, snapshot| {
            b.iter(|| black_box(filter.apply(snapshot)));
        });
    }

    group.finish();
}

/// Benchmark one write reaching an attached catalog
fn bench_snapshot_delivery(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_delivery");

    for size in [10, 100, 1_000] {
        group.bench_with_input(BenchmarkId::new("collection_size", size), &size, |b, &size| {
            let store = Arc::new(LocalStore::in_memory());
            let collection = SnippetCollection::new(store, CollectionKind::Snippets);
            for i in 0..size {
                collection.create(&input(i)).unwrap();
            }
            let sync = Arc::new(CatalogSynchronizer::new(collection.clone()));
            let _consumer = sync.attach();
            sync.pump();

            let mut i = size;
            b.iter(|| {
                collection.create(&input(i)).unwrap();
                i += 1;
                black_box(sync.pump());
            });
        });
    }

    group.finish();
}

/// Benchmark durable visitor increments
fn bench_record_visit(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        LocalStore::open(StoreConfig {
            sync_every_write: false,
            ..StoreConfig::at(dir.path().join("store"))
        })
        .unwrap(),
    );
    let counter = VisitorCounter::new(store);

    c.bench_function("record_visit", |b| {
        b.iter(|| counter.record_visit().unwrap());
    });
}

criterion_group!(benches, bench_filter, bench_snapshot_delivery, bench_record_visit);
criterion_main!(benches);
