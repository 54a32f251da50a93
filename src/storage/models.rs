//! Data models for stored rows.
//!
//! These mirror the persisted tables:
//! - Catalog entries (current state) and their history observations
//! - Category tags
//! - Quotes and authors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Convert a timestamp to the stored representation (Unix milliseconds).
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert a stored timestamp back to UTC, clamping unrepresentable values.
pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Current state of a catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Row identifier.
    pub id: i64,

    /// Natural key (e.g. a product code).
    pub external_id: String,

    pub category: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub image_ref: Option<String>,
    pub source_link: Option<String>,
    pub kind: Option<String>,
    pub availability: bool,

    /// Embedding of `summary`, absent until one has been computed.
    #[serde(skip)]
    pub summary_embedding: Option<Vec<f32>>,
}

/// The parts of an existing entry the change detector needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingEntry {
    pub id: i64,
    pub summary: Option<String>,
}

/// Descriptive fields written to `catalog_entry` on every ingestion.
#[derive(Debug, Clone, Copy)]
pub struct EntryUpsert<'a> {
    pub external_id: &'a str,
    pub category: Option<&'a str>,
    pub title: Option<&'a str>,
    pub summary: Option<&'a str>,
    pub image_ref: Option<&'a str>,
    pub source_link: Option<&'a str>,
    pub kind: Option<&'a str>,
    pub availability: bool,
    /// New embedding to store; `None` leaves the stored value untouched.
    pub summary_embedding: Option<&'a [f32]>,
}

/// One observation of an entry's volatile fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Row identifier (`None` before insertion).
    pub id: Option<i64>,

    /// Row identifier of the catalog entry observed.
    pub entry_ref: i64,

    /// Star rating, 0 to 5.
    pub rating: Option<i64>,

    /// Price in minor currency units.
    pub price: Option<i64>,

    pub stock_level: Option<i64>,

    /// Tax in minor currency units.
    pub tax_amount: Option<i64>,

    pub review_count: Option<i64>,

    /// When the crawl observed these values. Stored with millisecond
    /// precision, so finer sub-second digits do not survive a round trip.
    pub observed_at: DateTime<Utc>,
}

/// A category tag row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTag {
    pub id: i64,
    pub label: String,
}

/// A quote, unique on `(content, author)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRow {
    pub id: i64,
    pub content: String,
    /// Author slug.
    pub author: String,
    /// Comma-joined tag list.
    pub tags: Option<String>,
    pub observed_at: Option<DateTime<Utc>>,
}

/// An author, unique on `slug`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRow {
    pub id: i64,
    pub slug: String,
    pub name: Option<String>,
    pub link: Option<String>,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub catalog_entries: i64,
    /// Entries that have a summary embedding.
    pub embedded_entries: i64,
    pub history_rows: i64,
    pub category_tags: i64,
    pub quotes: i64,
    pub authors: i64,
}
