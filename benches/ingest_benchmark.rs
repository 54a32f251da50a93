//! Ingestion benchmarks.
//!
//! Measures the cost of re-ingesting a record whose summary is unchanged
//! (the common case in repeated crawls, no embedding work) against one whose
//! summary changed (embedding recomputed).
//!
//! **Benchmarks Included:**
//! - `reingest/unchanged_summary`: lookup, upsert and history append only
//! - `reingest/changed_summary`: the same plus a placeholder embedding
//! - `category/existing_tag`: insert-if-absent on a label already present
//!
//! **Run benchmarks:**
//! ```bash
//! cargo bench
//! cargo bench -- reingest
//! ```
//!
//! Databases live in a `TempDir` so file-backed WAL behaviour is included.

use std::sync::Arc;

use catalog_ingest::embeddings::{EmbeddingGateway, PlaceholderProvider};
use catalog_ingest::ingest::{BookRecord, Pipeline};
use catalog_ingest::storage::{Database, EMBEDDING_DIM};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

fn create_pipeline() -> (TempDir, Pipeline) {
    let tmpdir = TempDir::new().expect("failed to create temp dir");
    let db = Database::open(tmpdir.path().join("bench.db")).expect("failed to open database");
    let gateway = EmbeddingGateway::new(Arc::new(PlaceholderProvider::new(EMBEDDING_DIM)));
    let pipeline = Pipeline::new(db, gateway).expect("failed to start pipeline");
    (tmpdir, pipeline)
}

fn record(summary: String) -> BookRecord {
    BookRecord {
        title: Some("Soumission".to_string()),
        category: Some("Fiction".to_string()),
        summary: Some(summary),
        availability: true,
        rating: Some(1),
        price: Some(5010),
        stock_level: Some(20),
        ..BookRecord::new("6957f44c3847a760")
    }
}

fn bench_reingest(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("failed to build runtime");
    let mut group = c.benchmark_group("reingest");
    group.sample_size(10);
    group.measurement_time(std::time::Duration::from_secs(5));

    let (_tmp, pipeline) = create_pipeline();
    let unchanged = record("Dans une France assez proche de la nôtre".to_string());
    runtime
        .block_on(pipeline.ingest_book(&unchanged))
        .expect("seed ingestion failed");

    group.bench_function("unchanged_summary", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(pipeline.ingest_book(&unchanged).await.expect("ingest failed"));
        });
    });

    let (_tmp_changed, changed_pipeline) = create_pipeline();
    let mut revision = 0u64;
    group.bench_function("changed_summary", |b| {
        b.to_async(&runtime).iter(|| {
            revision += 1;
            let changed = record(format!("Revision {revision} of the summary"));
            let pipeline = &changed_pipeline;
            async move {
                black_box(pipeline.ingest_book(&changed).await.expect("ingest failed"));
            }
        });
    });

    group.finish();
}

fn bench_category(c: &mut Criterion) {
    let mut group = c.benchmark_group("category");
    group.sample_size(10);
    group.measurement_time(std::time::Duration::from_secs(5));

    let (_tmp, pipeline) = create_pipeline();
    pipeline
        .ensure_category("fiction")
        .expect("seed category failed");

    group.bench_function("existing_tag", |b| {
        b.iter(|| black_box(pipeline.ensure_category("fiction").expect("insert failed")));
    });

    group.finish();
}

criterion_group!(benches, bench_reingest, bench_category);

criterion_main!(benches);
