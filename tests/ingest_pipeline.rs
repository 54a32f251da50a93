//! Integration tests for the ingestion pipeline.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use catalog_ingest::embeddings::{placeholder_embedding, EmbeddingGateway, EmbeddingProvider};
use catalog_ingest::error::{EmbeddingError, StorageError};
use catalog_ingest::ingest::{
    AuthorRecord, BookRecord, CrawlRecord, EmbeddingAction, Pipeline, QuoteRecord, RecordOutcome,
};
use catalog_ingest::storage::{upsert_entry, Database, EntryUpsert};
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

const DIMS: usize = 16;

/// Provider that counts calls and returns a vector derived from the text.
struct Counting {
    calls: AtomicUsize,
}

impl Counting {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for Counting {
    fn model_name(&self) -> &str {
        "counting"
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str) -> catalog_ingest::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(placeholder_embedding(text, DIMS))
    }
}

/// Provider that always fails, like an unreachable service.
struct Unreachable;

#[async_trait]
impl EmbeddingProvider for Unreachable {
    fn model_name(&self) -> &str {
        "unreachable"
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn embed(&self, _text: &str) -> catalog_ingest::Result<Vec<f32>> {
        Err(EmbeddingError::Request("connection refused".to_string()).into())
    }
}

/// Provider that lets a second worker insert the key while the first one is
/// waiting for its embedding.
struct Racing {
    rival: Database,
    key: &'static str,
    raced: AtomicBool,
}

#[async_trait]
impl EmbeddingProvider for Racing {
    fn model_name(&self) -> &str {
        "racing"
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str) -> catalog_ingest::Result<Vec<f32>> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.rival.with_conn(|conn| {
                upsert_entry(
                    conn,
                    &EntryUpsert {
                        external_id: self.key,
                        category: None,
                        title: Some("Inserted by the other worker"),
                        summary: None,
                        image_ref: None,
                        source_link: None,
                        kind: None,
                        availability: false,
                        summary_embedding: None,
                    },
                )
                .map(|_| ())
            })?;
        }
        Ok(placeholder_embedding(text, DIMS))
    }
}

fn memory_pipeline(gateway: EmbeddingGateway) -> Pipeline {
    Pipeline::new(Database::open_in_memory().unwrap(), gateway).unwrap()
}

fn light_in_the_attic(summary: &str) -> BookRecord {
    BookRecord {
        category: Some("Poetry".to_string()),
        title: Some("A Light in the Attic".to_string()),
        summary: Some(summary.to_string()),
        source_link: Some("catalogue/a-light-in-the-attic_1000/index.html".to_string()),
        kind: Some("Books".to_string()),
        availability: true,
        rating: Some(3),
        price: Some(5177),
        stock_level: Some(22),
        tax_amount: Some(0),
        review_count: Some(0),
        ..BookRecord::new("a897fe39b1053632")
    }
}

/// Same record twice: one current-state row, two history rows.
#[tokio::test]
async fn test_reingestion_is_idempotent() {
    let pipeline = memory_pipeline(EmbeddingGateway::disabled());
    let record = light_in_the_attic("It's hard to imagine a world without A Light in the Attic.");

    let first = pipeline.ingest_book(&record).await.unwrap();
    let after_first = pipeline.get_entry(&record.external_id).unwrap();
    let second = pipeline.ingest_book(&record).await.unwrap();
    let after_second = pipeline.get_entry(&record.external_id).unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.entry_id, second.entry_id);
    assert_eq!(pipeline.count_entries().unwrap(), 1);
    assert_eq!(pipeline.count_history().unwrap(), 2);
    assert_eq!(after_first, after_second);
}

/// Unchanged text keeps the stored embedding; changed text replaces it.
#[tokio::test]
async fn test_embedding_recomputed_only_on_change() {
    let provider = Counting::new();
    let pipeline = memory_pipeline(EmbeddingGateway::new(provider.clone()));

    let outcome = pipeline.ingest_book(&light_in_the_attic("A")).await.unwrap();
    assert_eq!(outcome.embedding, EmbeddingAction::Computed);
    let e1 = pipeline
        .get_entry("a897fe39b1053632")
        .unwrap()
        .summary_embedding
        .unwrap();
    assert_eq!(e1.len(), DIMS);

    let outcome = pipeline.ingest_book(&light_in_the_attic("A")).await.unwrap();
    assert_eq!(outcome.embedding, EmbeddingAction::Retained);
    assert_eq!(provider.calls(), 1);
    let retained = pipeline.get_entry("a897fe39b1053632").unwrap();
    assert_eq!(retained.summary_embedding.as_deref(), Some(e1.as_slice()));

    let outcome = pipeline.ingest_book(&light_in_the_attic("B")).await.unwrap();
    assert_eq!(outcome.embedding, EmbeddingAction::Computed);
    assert_eq!(provider.calls(), 2);
    let changed = pipeline.get_entry("a897fe39b1053632").unwrap();
    assert_ne!(changed.summary_embedding.as_deref(), Some(e1.as_slice()));
    assert_eq!(changed.summary.as_deref(), Some("B"));
}

/// Clearing the summary never writes NULL over a stored embedding.
#[tokio::test]
async fn test_cleared_summary_keeps_stored_embedding() {
    let provider = Counting::new();
    let pipeline = memory_pipeline(EmbeddingGateway::new(provider.clone()));

    pipeline.ingest_book(&light_in_the_attic("A")).await.unwrap();
    let e1 = pipeline
        .get_entry("a897fe39b1053632")
        .unwrap()
        .summary_embedding;

    let cleared = BookRecord {
        summary: None,
        ..light_in_the_attic("unused")
    };
    let outcome = pipeline.ingest_book(&cleared).await.unwrap();

    assert_eq!(outcome.embedding, EmbeddingAction::Unavailable);
    assert_eq!(provider.calls(), 1);
    let entry = pipeline.get_entry("a897fe39b1053632").unwrap();
    assert!(entry.summary.is_none());
    assert_eq!(entry.summary_embedding, e1);
}

/// With no embedding service the record is still stored in full.
#[tokio::test]
async fn test_disabled_gateway_stores_base_fields() {
    let pipeline = memory_pipeline(EmbeddingGateway::disabled());
    let record = light_in_the_attic("Some summary");

    let outcome = pipeline.ingest_book(&record).await.unwrap();
    assert_eq!(outcome.embedding, EmbeddingAction::Unavailable);

    let entry = pipeline.get_entry(&record.external_id).unwrap();
    assert_eq!(entry.title.as_deref(), Some("A Light in the Attic"));
    assert_eq!(entry.category.as_deref(), Some("Poetry"));
    assert!(entry.availability);
    assert!(entry.summary_embedding.is_none());
}

/// A failing provider degrades to "no embedding" and the write still happens.
#[tokio::test]
async fn test_failing_provider_does_not_block_write() {
    let mut pipeline = memory_pipeline(EmbeddingGateway::new(Arc::new(Unreachable)));

    let outcome = pipeline
        .process(CrawlRecord::Book(light_in_the_attic("Some summary")))
        .await;

    assert!(outcome.is_success());
    assert_eq!(pipeline.count_entries().unwrap(), 1);
    assert_eq!(pipeline.stats().embeddings_unavailable, 1);
    assert_eq!(pipeline.stats().persistence_failures, 0);
}

/// N ingestions with distinct timestamps give N rows ordered by observation.
#[tokio::test]
async fn test_history_is_append_only_and_ordered() {
    let pipeline = memory_pipeline(EmbeddingGateway::disabled());
    let times = [
        Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap(),
    ];

    let mut first_rows = Vec::new();
    for (i, observed_at) in times.iter().enumerate() {
        let record = BookRecord {
            price: Some(5000 + i64::try_from(i).unwrap()),
            observed_at: *observed_at,
            ..light_in_the_attic("A")
        };
        pipeline.ingest_book(&record).await.unwrap();
        if i == 0 {
            first_rows = pipeline.list_history("a897fe39b1053632").unwrap();
        }
    }

    let history = pipeline.list_history("a897fe39b1053632").unwrap();
    assert_eq!(history.len(), 3);
    let observed: Vec<_> = history.iter().map(|h| h.observed_at).collect();
    assert_eq!(observed, vec![times[1], times[2], times[0]]);

    // The first observation is unchanged by later ingestions.
    let original = &first_rows[0];
    let still = history.iter().find(|h| h.id == original.id).unwrap();
    assert_eq!(still, original);
}

/// Inserting the same tag twice leaves one row and raises nothing.
#[tokio::test]
async fn test_category_dedup() {
    let pipeline = memory_pipeline(EmbeddingGateway::disabled());

    assert!(pipeline.ensure_category("fiction").unwrap());
    assert!(!pipeline.ensure_category("fiction").unwrap());

    let tags = pipeline.list_tags().unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].label, "fiction");
}

/// A failing history insert rolls back the current-state update.
#[tokio::test]
async fn test_failed_history_rolls_back_current_state() {
    let mut pipeline = memory_pipeline(EmbeddingGateway::disabled());
    pipeline
        .ingest_book(&light_in_the_attic("Original summary"))
        .await
        .unwrap();

    pipeline
        .database()
        .with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_history BEFORE INSERT ON entry_history
                 BEGIN SELECT RAISE(ABORT, 'history unavailable'); END;",
            )
            .map_err(StorageError::from)?;
            Ok(())
        })
        .unwrap();

    let updated = BookRecord {
        title: Some("Renamed".to_string()),
        ..light_in_the_attic("Rewritten summary")
    };
    let outcome = pipeline.process(CrawlRecord::Book(updated)).await;
    let RecordOutcome::Failed(err) = outcome else {
        panic!("expected the write to fail");
    };
    assert!(err.to_string().contains("a897fe39b1053632"), "{err}");

    let fresh = pipeline
        .process(CrawlRecord::Book(BookRecord::new("fresh-key")))
        .await;
    assert!(!fresh.is_success());

    let entry = pipeline.get_entry("a897fe39b1053632").unwrap();
    assert_eq!(entry.title.as_deref(), Some("A Light in the Attic"));
    assert_eq!(entry.summary.as_deref(), Some("Original summary"));
    assert_eq!(pipeline.count_entries().unwrap(), 1);
    assert_eq!(pipeline.count_history().unwrap(), 1);
    assert_eq!(pipeline.stats().persistence_failures, 2);
}

/// A blank natural key is rejected before anything is written.
#[tokio::test]
async fn test_blank_natural_key_rejected() {
    let mut pipeline = memory_pipeline(EmbeddingGateway::disabled());

    let outcome = pipeline
        .process(CrawlRecord::Book(BookRecord {
            external_id: "  ".to_string(),
            ..light_in_the_attic("A")
        }))
        .await;

    assert!(matches!(outcome, RecordOutcome::Failed(ref e) if e.is_validation()));
    assert_eq!(pipeline.count_entries().unwrap(), 0);
    assert_eq!(pipeline.count_history().unwrap(), 0);
    assert_eq!(pipeline.stats().validation_failures, 1);
}

/// A malformed line is skipped and the rest of the stream is processed.
#[tokio::test]
async fn test_jsonl_stream_survives_bad_lines() {
    let mut pipeline = memory_pipeline(EmbeddingGateway::disabled());
    let input = r#"{"type":"category","label":"Travel"}
{"type":"book","upc":"e00eb4fd7b871a48","title":"Sharp Objects","genre":"Mystery","rating":4,"price":4733}
this is not json

{"type":"book","upc":"","title":"No key"}
{"type":"quote","content":"A reader lives a thousand lives before he dies.","author":"george-r-r-martin","tags":["books","reading"]}
{"type":"author","slug":"george-r-r-martin","name":"George R.R. Martin"}
{"type":"category","label":"Travel"}
"#;

    let stats = pipeline.ingest_lines(Cursor::new(input)).await.unwrap();

    assert_eq!(stats.categories_created, 1);
    assert_eq!(stats.categories_existing, 1);
    assert_eq!(stats.books_created, 1);
    assert_eq!(stats.quotes, 1);
    assert_eq!(stats.authors, 1);
    assert_eq!(stats.validation_failures, 2);
    assert_eq!(stats.succeeded(), 5);

    let entry = pipeline.get_entry("e00eb4fd7b871a48").unwrap();
    assert_eq!(entry.category.as_deref(), Some("Mystery"));
    let quote = pipeline
        .get_quote(
            "A reader lives a thousand lives before he dies.",
            "george-r-r-martin",
        )
        .unwrap();
    assert_eq!(quote.tags.as_deref(), Some("books,reading"));
}

/// Composite-key upserts overwrite only mutable fields.
#[tokio::test]
async fn test_quote_and_author_upserts() {
    let pipeline = memory_pipeline(EmbeddingGateway::disabled());
    let content = "The person, be it gentleman or lady, who has not pleasure in a good novel, must be intolerably stupid.";

    let first = pipeline
        .ingest_quote(&QuoteRecord {
            content: content.to_string(),
            author: "jane-austen".to_string(),
            tags: vec!["books".to_string()],
            observed_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        })
        .unwrap();
    let second = pipeline
        .ingest_quote(&QuoteRecord {
            content: content.to_string(),
            author: "jane-austen".to_string(),
            tags: vec!["books".to_string(), "humor".to_string()],
            observed_at: Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
        })
        .unwrap();
    assert_eq!(first, second);

    let quote = pipeline.get_quote(content, "jane-austen").unwrap();
    assert_eq!(quote.tags.as_deref(), Some("books,humor"));

    let a = pipeline
        .ingest_author(&AuthorRecord {
            slug: "jane-austen".to_string(),
            name: Some("Jane Austen".to_string()),
            link: None,
        })
        .unwrap();
    let b = pipeline
        .ingest_author(&AuthorRecord {
            slug: "jane-austen".to_string(),
            name: Some("Jane Austen".to_string()),
            link: Some("/author/Jane-Austen".to_string()),
        })
        .unwrap();
    assert_eq!(a, b);
    assert_eq!(
        pipeline.get_author("jane-austen").unwrap().link.as_deref(),
        Some("/author/Jane-Austen")
    );

    let counts = pipeline.table_counts().unwrap();
    assert_eq!(counts.quotes, 1);
    assert_eq!(counts.authors, 1);
}

/// A dropped or stuck connection is replaced before the next record.
#[tokio::test]
async fn test_pipeline_recovers_connection() {
    let tmp = TempDir::new().unwrap();
    let db = Database::open(tmp.path().join("catalog.db")).unwrap();
    let mut pipeline = Pipeline::new(db, EmbeddingGateway::disabled()).unwrap();

    let record = CrawlRecord::Book(light_in_the_attic("A"));
    assert!(pipeline.process(record.clone()).await.is_success());

    pipeline.database().close();
    assert!(pipeline.process(record.clone()).await.is_success());

    pipeline
        .database()
        .with_conn(|conn| {
            conn.execute_batch("BEGIN").map_err(StorageError::from)?;
            Ok(())
        })
        .unwrap();
    assert!(pipeline.process(record).await.is_success());

    assert_eq!(pipeline.count_entries().unwrap(), 1);
    assert_eq!(pipeline.count_history().unwrap(), 3);
    assert_eq!(pipeline.stats().connection_failures, 0);
}

/// Two workers with their own connections never duplicate a key.
#[tokio::test]
async fn test_two_workers_share_store_without_duplicates() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("catalog.db");
    let first = Pipeline::new(Database::open(&path).unwrap(), EmbeddingGateway::disabled()).unwrap();
    let second =
        Pipeline::new(Database::open(&path).unwrap(), EmbeddingGateway::disabled()).unwrap();

    let record = light_in_the_attic("A");
    let a = first.ingest_book(&record).await.unwrap();
    let b = second.ingest_book(&record).await.unwrap();

    assert_eq!(a.entry_id, b.entry_id);
    assert!(a.created);
    assert!(!b.created);
    assert_eq!(first.count_entries().unwrap(), 1);
    assert_eq!(second.count_history().unwrap(), 2);

    let _ = first.finish();
    let _ = second.finish();
}

/// An unreachable store fails only the record at hand; the next record
/// reconnects and goes through.
#[tokio::test]
async fn test_unreachable_store_fails_one_record_then_recovers() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("store");
    let aside = tmp.path().join("store-aside");
    let db = Database::open(dir.join("catalog.db")).unwrap();
    let mut pipeline = Pipeline::new(db, EmbeddingGateway::disabled()).unwrap();

    let record = CrawlRecord::Book(light_in_the_attic("A"));
    assert!(pipeline.process(record.clone()).await.is_success());

    // Drop the connection and put a plain file where the directory was.
    pipeline.database().close();
    std::fs::rename(&dir, &aside).unwrap();
    std::fs::write(&dir, b"blocked").unwrap();

    let outcome = pipeline.process(record.clone()).await;
    assert!(matches!(outcome, RecordOutcome::Failed(ref e) if e.is_connection()));
    assert_eq!(pipeline.stats().connection_failures, 1);

    std::fs::remove_file(&dir).unwrap();
    std::fs::rename(&aside, &dir).unwrap();

    assert!(pipeline.process(record).await.is_success());
    let stats = pipeline.stats();
    assert_eq!(stats.connection_failures, 1);
    assert_eq!(stats.books_created, 1);
    assert_eq!(stats.books_updated, 1);
    assert_eq!(pipeline.count_entries().unwrap(), 1);
    assert_eq!(pipeline.count_history().unwrap(), 2);
}

/// A key inserted by another worker between lookup and write is reported
/// as an update, not a creation.
#[tokio::test]
async fn test_key_inserted_during_embedding_counts_as_update() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("catalog.db");
    let db = Database::open(&path).unwrap();
    let provider = Arc::new(Racing {
        rival: Database::open(&path).unwrap(),
        key: "a897fe39b1053632",
        raced: AtomicBool::new(false),
    });
    let mut pipeline = Pipeline::new(db, EmbeddingGateway::new(provider)).unwrap();

    let outcome = pipeline
        .process(CrawlRecord::Book(light_in_the_attic("A")))
        .await;

    let RecordOutcome::Book(book) = outcome else {
        panic!("expected the book to be stored");
    };
    assert!(!book.created);
    assert_eq!(book.embedding, EmbeddingAction::Computed);
    assert_eq!(pipeline.stats().books_created, 0);
    assert_eq!(pipeline.stats().books_updated, 1);
    assert_eq!(pipeline.count_entries().unwrap(), 1);
    assert_eq!(pipeline.count_history().unwrap(), 1);

    let entry = pipeline.get_entry("a897fe39b1053632").unwrap();
    assert_eq!(entry.title.as_deref(), Some("A Light in the Attic"));
    assert_eq!(entry.summary_embedding.map(|e| e.len()), Some(DIMS));
}

/// Crawler field names: `genre` for categories and a comma-joined tag string.
#[tokio::test]
async fn test_jsonl_accepts_crawler_field_names() {
    let mut pipeline = memory_pipeline(EmbeddingGateway::disabled());
    let input = r#"{"type":"category","genre":"Poetry"}
{"type":"quote","content":"Not all those who wander are lost.","author":"j-r-r-tolkien","tags":"adventure, travel,"}
"#;

    let stats = pipeline.ingest_lines(Cursor::new(input)).await.unwrap();

    assert_eq!(stats.categories_created, 1);
    assert_eq!(stats.quotes, 1);
    assert_eq!(stats.validation_failures, 0);
    assert_eq!(pipeline.list_tags().unwrap()[0].label, "Poetry");
    let quote = pipeline
        .get_quote("Not all those who wander are lost.", "j-r-r-tolkien")
        .unwrap();
    assert_eq!(quote.tags.as_deref(), Some("adventure,travel"));
}
