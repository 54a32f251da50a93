//! `SQLite` storage for crawled catalog data.
//!
//! This module provides persistent storage for:
//! - Catalog entries (current state, with optional summary embeddings)
//! - Entry history (append-only observations)
//! - Category tags (dedup set)
//! - Quotes and authors (composite natural keys)

mod catalog;
mod connection;
mod history;
mod models;
mod quotes;
mod schema;
mod tags;
mod vector;

pub use catalog::{count_embedded_entries, count_entries, find_entry, get_entry, upsert_entry};
pub use connection::Database;
pub use history::{append_history, count_history, list_history};
pub use models::{
    AuthorRow, CatalogEntry, CategoryTag, EntryUpsert, ExistingEntry, HistoryEntry, QuoteRow,
    TableCounts,
};
pub use quotes::{count_authors, count_quotes, get_author, get_quote, upsert_author, upsert_quote};
pub use schema::{migrate, verify_schema, SCHEMA_VERSION};
pub use tags::{count_tags, insert_tag_if_absent, list_tags};
pub use vector::{blob_to_vector, vector_to_blob, EMBEDDING_DIM};

use rusqlite::Connection;

/// Initialize storage with migrations.
///
/// Idempotent; run once before the first record is processed.
///
/// # Errors
///
/// Returns an error if database initialization fails.
pub fn init_storage(db: &Database) -> crate::Result<()> {
    db.with_conn(|conn| {
        migrate(conn)?;
        verify_schema(conn)?;

        tracing::info!("Storage initialized, schema version {SCHEMA_VERSION}");
        Ok(())
    })
}

/// Count rows in every table.
///
/// # Errors
///
/// Returns an error if any count query fails.
pub fn table_counts(conn: &Connection) -> crate::Result<TableCounts> {
    Ok(TableCounts {
        catalog_entries: count_entries(conn)?,
        embedded_entries: count_embedded_entries(conn)?,
        history_rows: count_history(conn, None)?,
        category_tags: count_tags(conn)?,
        quotes: count_quotes(conn)?,
        authors: count_authors(conn)?,
    })
}
