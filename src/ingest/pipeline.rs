//! The ingestion pipeline.
//!
//! One [`Pipeline`] per worker. It owns the worker's connection manager and
//! embedding gateway and processes records strictly one at a time. A record
//! that fails is logged, counted and dropped; the next record is always
//! attempted.

use std::io::BufRead;

use serde::Serialize;
use tracing::Instrument;

use super::change::needs_embedding;
use super::record::{AuthorRecord, BookRecord, CategoryRecord, CrawlRecord, QuoteRecord};
use crate::config::Config;
use crate::embeddings::EmbeddingGateway;
use crate::error::ValidationError;
use crate::storage::{
    self, append_history, find_entry, insert_tag_if_absent, upsert_author, upsert_entry,
    upsert_quote, AuthorRow, CatalogEntry, CategoryTag, Database, EntryUpsert, HistoryEntry,
    QuoteRow, TableCounts,
};
use crate::telemetry::metrics::{EMBEDDINGS_TOTAL, RECORDS_TOTAL};
use crate::telemetry::spans;
use crate::{Error, Result};

/// What happened to the summary embedding during one ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingAction {
    /// A new embedding was computed and stored.
    Computed,
    /// The summary was unchanged; the stored embedding was left as is.
    Retained,
    /// An embedding was needed but the gateway returned none.
    Unavailable,
    /// First sighting without a summary.
    NotNeeded,
}

impl EmbeddingAction {
    const fn label(self) -> &'static str {
        match self {
            Self::Computed => "computed",
            Self::Retained => "retained",
            Self::Unavailable => "unavailable",
            Self::NotNeeded => "not_needed",
        }
    }
}

/// Result of a successful book ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BookOutcome {
    /// Row id of the catalog entry.
    pub entry_id: i64,
    /// Whether this was the first sighting of the key.
    pub created: bool,
    pub embedding: EmbeddingAction,
}

/// Result of [`Pipeline::process`].
#[derive(Debug)]
pub enum RecordOutcome {
    Book(BookOutcome),
    Category { created: bool },
    Quote { id: i64 },
    Author { id: i64 },
    /// The record was dropped.
    Failed(Error),
}

impl RecordOutcome {
    /// Whether the record was persisted.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Running totals for one pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub books_created: u64,
    pub books_updated: u64,
    pub categories_created: u64,
    pub categories_existing: u64,
    pub quotes: u64,
    pub authors: u64,
    pub embeddings_computed: u64,
    pub embeddings_retained: u64,
    pub embeddings_unavailable: u64,
    pub validation_failures: u64,
    pub connection_failures: u64,
    pub persistence_failures: u64,
}

impl IngestStats {
    /// Records persisted successfully.
    #[must_use]
    pub const fn succeeded(&self) -> u64 {
        self.books_created
            + self.books_updated
            + self.categories_created
            + self.categories_existing
            + self.quotes
            + self.authors
    }

    /// Records dropped.
    #[must_use]
    pub const fn failed(&self) -> u64 {
        self.validation_failures + self.connection_failures + self.persistence_failures
    }

    fn record_success(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Book(book) => {
                if book.created {
                    self.books_created += 1;
                } else {
                    self.books_updated += 1;
                }
                match book.embedding {
                    EmbeddingAction::Computed => self.embeddings_computed += 1,
                    EmbeddingAction::Retained => self.embeddings_retained += 1,
                    EmbeddingAction::Unavailable => self.embeddings_unavailable += 1,
                    EmbeddingAction::NotNeeded => {}
                }
            }
            RecordOutcome::Category { created: true } => self.categories_created += 1,
            RecordOutcome::Category { created: false } => self.categories_existing += 1,
            RecordOutcome::Quote { .. } => self.quotes += 1,
            RecordOutcome::Author { .. } => self.authors += 1,
            RecordOutcome::Failed(e) => self.record_failure(e),
        }
    }

    fn record_failure(&mut self, error: &Error) {
        if error.is_validation() {
            self.validation_failures += 1;
        } else if error.is_connection() {
            self.connection_failures += 1;
        } else {
            self.persistence_failures += 1;
        }
    }
}

/// Single-worker ingestion pipeline.
pub struct Pipeline {
    db: Database,
    gateway: EmbeddingGateway,
    stats: IngestStats,
}

impl Pipeline {
    /// Open the configured database and embedding service, then prepare the
    /// schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated, or the
    /// embedding client cannot be built.
    pub fn start(config: &Config) -> Result<Self> {
        config.validate()?;
        let db = Database::open(&config.database_path)?;
        let gateway = EmbeddingGateway::from_settings(&config.embedding)?;
        Self::new(db, gateway)
    }

    /// Build a pipeline over an open database. Runs schema creation before
    /// any record is accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation or verification fails.
    pub fn new(db: Database, gateway: EmbeddingGateway) -> Result<Self> {
        db.ensure_connection()?;
        storage::init_storage(&db)?;

        tracing::info!(
            path = %db.path(),
            embeddings = gateway.is_enabled(),
            "Ingestion pipeline started"
        );

        Ok(Self {
            db,
            gateway,
            stats: IngestStats::default(),
        })
    }

    /// Persist one catalog entry observation.
    ///
    /// Upserts the current state and appends one history row in a single
    /// transaction. The embedding is recomputed only when the summary
    /// changed; a missing embedding never blocks the write.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any write, a connection error if
    /// the store is unreachable, or a persistence error after rollback.
    pub async fn ingest_book(&self, record: &BookRecord) -> Result<BookOutcome> {
        record.validate()?;
        let key = record.external_id.as_str();

        self.db.ensure_connection()?;
        let existing = self
            .db
            .with_conn(|conn| find_entry(conn, key))
            .map_err(|e| persistence("book", key, e))?;

        let had_row = existing.is_some();
        let stored_summary = existing.as_ref().and_then(|e| e.summary.as_deref());
        let candidate = record.summary.as_deref();

        let (embedding, action) = if needs_embedding(candidate, stored_summary, had_row) {
            match self.gateway.embed(candidate.unwrap_or_default()).await {
                Some(vector) => (Some(vector), EmbeddingAction::Computed),
                None => (None, EmbeddingAction::Unavailable),
            }
        } else if had_row {
            (None, EmbeddingAction::Retained)
        } else {
            (None, EmbeddingAction::NotNeeded)
        };

        let upsert = EntryUpsert {
            external_id: key,
            category: record.category.as_deref(),
            title: record.title.as_deref(),
            summary: candidate,
            image_ref: record.image_ref.as_deref(),
            source_link: record.source_link.as_deref(),
            kind: record.kind.as_deref(),
            availability: record.availability,
            summary_embedding: embedding.as_deref(),
        };

        // The embedding call may have taken long enough for the connection to go stale.
        self.db.ensure_connection()?;
        let (entry_id, created) = {
            let _span = spans::db_span("upsert", "catalog_entry").entered();
            self.db.with_transaction(|conn| {
                // Another worker may have inserted the key since the lookup above.
                let created = find_entry(conn, key)?.is_none();
                let entry_id = upsert_entry(conn, &upsert)?;
                append_history(
                    conn,
                    &HistoryEntry {
                        id: None,
                        entry_ref: entry_id,
                        rating: record.rating,
                        price: record.price,
                        stock_level: record.stock_level,
                        tax_amount: record.tax_amount,
                        review_count: record.review_count,
                        observed_at: record.observed_at,
                    },
                )?;
                Ok((entry_id, created))
            })
        }
        .map_err(|e| persistence("book", key, e))?;

        if matches!(action, EmbeddingAction::Retained | EmbeddingAction::Unavailable) {
            EMBEDDINGS_TOTAL.with_label_values(&[action.label()]).inc();
        }
        tracing::info!(
            entry_id,
            created,
            embedding = action.label(),
            "Persisted book"
        );

        Ok(BookOutcome {
            entry_id,
            created,
            embedding: action,
        })
    }

    /// Make sure a category tag exists. Returns `true` if it was added.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank label, a connection error if
    /// the store is unreachable, or a persistence error.
    pub fn ensure_category(&self, label: &str) -> Result<bool> {
        let record = CategoryRecord {
            label: label.trim().to_string(),
        };
        record.validate()?;

        self.db.ensure_connection()?;
        let created = {
            let _span = spans::db_span("insert_if_absent", "category_tag").entered();
            self.db.with_conn(|conn| insert_tag_if_absent(conn, &record.label))
        }
        .map_err(|e| persistence("category", &record.label, e))?;

        tracing::debug!(label = %record.label, created, "Ensured category");
        Ok(created)
    }

    /// Upsert a quote on `(content, author)`. Returns the row id.
    ///
    /// # Errors
    ///
    /// Returns a validation, connection, or persistence error.
    pub fn ingest_quote(&self, record: &QuoteRecord) -> Result<i64> {
        record.validate()?;
        let tags = record.joined_tags();

        self.db.ensure_connection()?;
        let id = {
            let _span = spans::db_span("upsert", "quote").entered();
            self.db.with_transaction(|conn| {
                upsert_quote(
                    conn,
                    &record.content,
                    &record.author,
                    tags.as_deref(),
                    record.observed_at,
                )
            })
        }
        .map_err(|e| persistence("quote", &record.author, e))?;

        tracing::debug!(id, author = %record.author, "Persisted quote");
        Ok(id)
    }

    /// Upsert an author on `slug`. Returns the row id.
    ///
    /// # Errors
    ///
    /// Returns a validation, connection, or persistence error.
    pub fn ingest_author(&self, record: &AuthorRecord) -> Result<i64> {
        record.validate()?;

        self.db.ensure_connection()?;
        let id = {
            let _span = spans::db_span("upsert", "author").entered();
            self.db.with_transaction(|conn| {
                upsert_author(
                    conn,
                    &record.slug,
                    record.name.as_deref(),
                    record.link.as_deref(),
                )
            })
        }
        .map_err(|e| persistence("author", &record.slug, e))?;

        tracing::debug!(id, slug = %record.slug, "Persisted author");
        Ok(id)
    }

    /// Process one record, containing any failure.
    ///
    /// Never returns an error: failures are logged with the entity, natural
    /// key, operation and cause, counted, and reported in the outcome.
    pub async fn process(&mut self, record: CrawlRecord) -> RecordOutcome {
        let entity = record.entity();
        let key = record.key();
        let span = spans::record_span(entity, &key);

        let result = async {
            match &record {
                CrawlRecord::Book(book) => self.ingest_book(book).await.map(RecordOutcome::Book),
                CrawlRecord::Category(category) => self
                    .ensure_category(&category.label)
                    .map(|created| RecordOutcome::Category { created }),
                CrawlRecord::Quote(quote) => {
                    self.ingest_quote(quote).map(|id| RecordOutcome::Quote { id })
                }
                CrawlRecord::Author(author) => {
                    self.ingest_author(author).map(|id| RecordOutcome::Author { id })
                }
            }
        }
        .instrument(span.clone())
        .await;

        let outcome = match result {
            Ok(outcome) => {
                RECORDS_TOTAL
                    .with_label_values(&[entity, success_label(&outcome)])
                    .inc();
                outcome
            }
            Err(e) => {
                let _guard = span.enter();
                let label = failure_label(&e);
                if e.is_validation() {
                    tracing::warn!(operation = operation(entity), error = %e, "Record rejected");
                } else {
                    tracing::error!(operation = operation(entity), error = %e, "Record dropped");
                }
                RECORDS_TOTAL.with_label_values(&[entity, label]).inc();
                RecordOutcome::Failed(e)
            }
        };

        self.stats.record_success(&outcome);
        outcome
    }

    /// Process every JSON Lines record from `reader`.
    ///
    /// Blank lines are skipped. A line that does not decode into a record is
    /// rejected on its own; later lines are still processed.
    ///
    /// # Errors
    ///
    /// Returns an error only if reading from `reader` fails.
    pub async fn ingest_lines<R: BufRead>(&mut self, reader: R) -> Result<IngestStats> {
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<CrawlRecord>(&line) {
                Ok(record) => {
                    self.process(record).await;
                }
                Err(e) => {
                    let error = Error::from(ValidationError::Malformed {
                        line: index + 1,
                        reason: e.to_string(),
                    });
                    tracing::warn!(error = %error, "Skipping unreadable record");
                    RECORDS_TOTAL.with_label_values(&["unknown", "malformed"]).inc();
                    self.stats.record_failure(&error);
                }
            }
        }

        Ok(self.stats)
    }

    /// Totals so far.
    #[must_use]
    pub const fn stats(&self) -> IngestStats {
        self.stats
    }

    /// The connection manager, for maintenance and tests.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Release the connection and return the final totals.
    #[must_use]
    pub fn finish(self) -> IngestStats {
        self.db.close();
        tracing::info!(
            succeeded = self.stats.succeeded(),
            failed = self.stats.failed(),
            embeddings_computed = self.stats.embeddings_computed,
            "Ingestion pipeline finished"
        );
        self.stats
    }

    /// Current state of an entry.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the key is unknown.
    pub fn get_entry(&self, external_id: &str) -> Result<CatalogEntry> {
        self.db.ensure_connection()?;
        self.db.with_conn(|conn| storage::get_entry(conn, external_id))
    }

    /// History of an entry, oldest observation first.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the key is unknown.
    pub fn list_history(&self, external_id: &str) -> Result<Vec<HistoryEntry>> {
        self.db.ensure_connection()?;
        self.db.with_conn(|conn| {
            let entry = find_entry(conn, external_id)?
                .ok_or_else(|| crate::error::StorageError::not_found("catalog_entry", external_id))?;
            storage::list_history(conn, entry.id)
        })
    }

    /// Number of catalog entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_entries(&self) -> Result<i64> {
        self.db.ensure_connection()?;
        self.db.with_conn(storage::count_entries)
    }

    /// Number of history rows across all entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_history(&self) -> Result<i64> {
        self.db.ensure_connection()?;
        self.db.with_conn(|conn| storage::count_history(conn, None))
    }

    /// All category tags, ordered by label.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_tags(&self) -> Result<Vec<CategoryTag>> {
        self.db.ensure_connection()?;
        self.db.with_conn(storage::list_tags)
    }

    /// A quote by its composite key.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if no such quote exists.
    pub fn get_quote(&self, content: &str, author: &str) -> Result<QuoteRow> {
        self.db.ensure_connection()?;
        self.db.with_conn(|conn| storage::get_quote(conn, content, author))
    }

    /// An author by slug.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if no such author exists.
    pub fn get_author(&self, slug: &str) -> Result<AuthorRow> {
        self.db.ensure_connection()?;
        self.db.with_conn(|conn| storage::get_author(conn, slug))
    }

    /// Row counts for every table.
    ///
    /// # Errors
    ///
    /// Returns an error if any count fails.
    pub fn table_counts(&self) -> Result<TableCounts> {
        self.db.ensure_connection()?;
        self.db.with_conn(storage::table_counts)
    }
}

/// Attach the natural key to a write failure. Connection and validation
/// errors keep their own kind.
fn persistence(entity: &'static str, key: &str, error: Error) -> Error {
    if error.is_connection() || error.is_validation() {
        error
    } else {
        Error::persistence(entity, key, error)
    }
}

fn operation(entity: &str) -> &'static str {
    if entity == "category" {
        "insert_if_absent"
    } else {
        "upsert"
    }
}

const fn success_label(outcome: &RecordOutcome) -> &'static str {
    match outcome {
        RecordOutcome::Book(BookOutcome { created: true, .. })
        | RecordOutcome::Category { created: true } => "created",
        RecordOutcome::Category { created: false } => "existing",
        RecordOutcome::Failed(_) => "failed",
        _ => "updated",
    }
}

const fn failure_label(error: &Error) -> &'static str {
    if error.is_validation() {
        "invalid"
    } else if error.is_connection() {
        "connection_error"
    } else {
        "persistence_error"
    }
}
