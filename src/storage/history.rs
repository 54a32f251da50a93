//! Entry history storage.
//!
//! Rows are appended once per ingestion and never updated or deleted.

use rusqlite::{params, Connection};

use super::models::{from_millis, to_millis, HistoryEntry};
use crate::error::StorageError;
use crate::Result;

/// Append one observation for an entry.
///
/// Returns the assigned row id.
///
/// # Errors
///
/// Returns an error if the insertion fails.
pub fn append_history(conn: &Connection, entry: &HistoryEntry) -> Result<i64> {
    conn.execute(
        "INSERT INTO entry_history (
            entry_ref, rating, price, stock_level, tax_amount, review_count, observed_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            entry.entry_ref,
            entry.rating,
            entry.price,
            entry.stock_level,
            entry.tax_amount,
            entry.review_count,
            to_millis(entry.observed_at),
        ],
    )
    .map_err(|e| StorageError::Database(format!("failed to append history: {e}")))?;

    let id = conn.last_insert_rowid();
    tracing::trace!(id, entry_ref = entry.entry_ref, "Appended history row");
    Ok(id)
}

/// List all observations for an entry, oldest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_history(conn: &Connection, entry_ref: i64) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, entry_ref, rating, price, stock_level, tax_amount, review_count, observed_at
             FROM entry_history
             WHERE entry_ref = ?
             ORDER BY observed_at, id",
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

    let rows = stmt
        .query_map([entry_ref], |row| {
            Ok(HistoryEntry {
                id: Some(row.get(0)?),
                entry_ref: row.get(1)?,
                rating: row.get(2)?,
                price: row.get(3)?,
                stock_level: row.get(4)?,
                tax_amount: row.get(5)?,
                review_count: row.get(6)?,
                observed_at: from_millis(row.get(7)?),
            })
        })
        .map_err(|e| StorageError::Database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| StorageError::Database(e.to_string()))?;

    Ok(rows)
}

/// Count history rows, optionally for a single entry.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_history(conn: &Connection, entry_ref: Option<i64>) -> Result<i64> {
    let result = match entry_ref {
        Some(id) => conn.query_row(
            "SELECT COUNT(*) FROM entry_history WHERE entry_ref = ?",
            [id],
            |row| row.get(0),
        ),
        None => conn.query_row("SELECT COUNT(*) FROM entry_history", [], |row| row.get(0)),
    };

    result.map_err(|e| StorageError::Database(e.to_string()).into())
}
