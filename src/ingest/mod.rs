//! Record ingestion.
//!
//! Turns crawl records into persisted rows:
//! - Typed records validated at the boundary
//! - Change detection that gates embedding work
//! - The per-worker [`Pipeline`] with per-record failure containment

mod change;
mod pipeline;
mod record;

pub use change::needs_embedding;
pub use pipeline::{BookOutcome, EmbeddingAction, IngestStats, Pipeline, RecordOutcome};
pub use record::{AuthorRecord, BookRecord, CategoryRecord, CrawlRecord, QuoteRecord, MAX_RATING};
