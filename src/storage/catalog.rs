//! Catalog entry storage operations.
//!
//! One row per `external_id`. Upserts rely on `SQLite`'s native
//! `ON CONFLICT` resolution so concurrent writers never create duplicates.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{CatalogEntry, EntryUpsert, ExistingEntry};
use super::vector::{blob_to_vector, vector_to_blob};
use crate::error::StorageError;
use crate::Result;

const UPSERT_KEEP_EMBEDDING: &str = "
    INSERT INTO catalog_entry (
        external_id, category, title, summary, image_ref, source_link, kind, availability
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT(external_id) DO UPDATE SET
        category = excluded.category,
        title = excluded.title,
        summary = excluded.summary,
        image_ref = excluded.image_ref,
        source_link = excluded.source_link,
        kind = excluded.kind,
        availability = excluded.availability
    RETURNING id
";

const UPSERT_REPLACE_EMBEDDING: &str = "
    INSERT INTO catalog_entry (
        external_id, category, title, summary, image_ref, source_link, kind, availability,
        summary_embedding
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT(external_id) DO UPDATE SET
        category = excluded.category,
        title = excluded.title,
        summary = excluded.summary,
        image_ref = excluded.image_ref,
        source_link = excluded.source_link,
        kind = excluded.kind,
        availability = excluded.availability,
        summary_embedding = excluded.summary_embedding
    RETURNING id
";

/// Look up the row id and stored summary for an external id.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn find_entry(conn: &Connection, external_id: &str) -> Result<Option<ExistingEntry>> {
    conn.query_row(
        "SELECT id, summary FROM catalog_entry WHERE external_id = ?",
        [external_id],
        |row| {
            Ok(ExistingEntry {
                id: row.get(0)?,
                summary: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(|e| StorageError::Database(format!("failed to look up entry: {e}")).into())
}

/// Insert or update the current state of an entry.
///
/// Every descriptive column is overwritten on conflict. The embedding column
/// is only written when `entry.summary_embedding` is set; otherwise the
/// stored embedding is left as it was.
///
/// Returns the row id of the inserted or updated entry.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub fn upsert_entry(conn: &Connection, entry: &EntryUpsert<'_>) -> Result<i64> {
    let result = match entry.summary_embedding {
        Some(embedding) => conn.query_row(
            UPSERT_REPLACE_EMBEDDING,
            params![
                entry.external_id,
                entry.category,
                entry.title,
                entry.summary,
                entry.image_ref,
                entry.source_link,
                entry.kind,
                entry.availability,
                vector_to_blob(embedding),
            ],
            |row| row.get(0),
        ),
        None => conn.query_row(
            UPSERT_KEEP_EMBEDDING,
            params![
                entry.external_id,
                entry.category,
                entry.title,
                entry.summary,
                entry.image_ref,
                entry.source_link,
                entry.kind,
                entry.availability,
            ],
            |row| row.get(0),
        ),
    };

    let id = result.map_err(|e| StorageError::Database(format!("failed to upsert entry: {e}")))?;
    tracing::trace!(id, external_id = %entry.external_id, "Upserted catalog entry");
    Ok(id)
}

/// Get an entry by external id, including its embedding.
///
/// # Errors
///
/// Returns an error if the entry is not found or the query fails.
pub fn get_entry(conn: &Connection, external_id: &str) -> Result<CatalogEntry> {
    let row = conn
        .query_row(
            "SELECT id, external_id, category, title, summary, image_ref, source_link, kind,
                    availability, summary_embedding
             FROM catalog_entry WHERE external_id = ?",
            [external_id],
            read_entry,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StorageError::not_found("catalog_entry", external_id)
            }
            e => StorageError::Database(format!("failed to get entry: {e}")),
        })?;

    let (mut entry, blob) = row;
    entry.summary_embedding = blob.as_deref().map(blob_to_vector).transpose()?;
    Ok(entry)
}

fn read_entry(row: &Row<'_>) -> rusqlite::Result<(CatalogEntry, Option<Vec<u8>>)> {
    Ok((
        CatalogEntry {
            id: row.get(0)?,
            external_id: row.get(1)?,
            category: row.get(2)?,
            title: row.get(3)?,
            summary: row.get(4)?,
            image_ref: row.get(5)?,
            source_link: row.get(6)?,
            kind: row.get(7)?,
            availability: row.get(8)?,
            summary_embedding: None,
        },
        row.get(9)?,
    ))
}

/// Count catalog entries.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_entries(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM catalog_entry", [], |row| row.get(0))
        .map_err(|e| StorageError::Database(e.to_string()).into())
}

/// Count entries that have an embedding stored.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_embedded_entries(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM catalog_entry WHERE summary_embedding IS NOT NULL",
        [],
        |row| row.get(0),
    )
    .map_err(|e| StorageError::Database(e.to_string()).into())
}
