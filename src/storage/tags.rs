//! Category tag storage.
//!
//! Tags have set semantics: inserting a label that already exists is a no-op.

use rusqlite::Connection;

use super::models::CategoryTag;
use crate::error::StorageError;
use crate::Result;

/// Insert a tag unless it is already present.
///
/// Returns `true` if a new row was created.
///
/// # Errors
///
/// Returns an error if the statement fails for any reason other than the
/// label already existing.
pub fn insert_tag_if_absent(conn: &Connection, label: &str) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT INTO category_tag (label) VALUES (?) ON CONFLICT(label) DO NOTHING",
            [label],
        )
        .map_err(|e| StorageError::Database(format!("failed to insert tag: {e}")))?;

    Ok(inserted > 0)
}

/// List all tags ordered by label.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_tags(conn: &Connection) -> Result<Vec<CategoryTag>> {
    let mut stmt = conn
        .prepare("SELECT id, label FROM category_tag ORDER BY label")
        .map_err(|e| StorageError::Database(e.to_string()))?;

    let tags = stmt
        .query_map([], |row| {
            Ok(CategoryTag {
                id: row.get(0)?,
                label: row.get(1)?,
            })
        })
        .map_err(|e| StorageError::Database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| StorageError::Database(e.to_string()))?;

    Ok(tags)
}

/// Count tags.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_tags(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM category_tag", [], |row| row.get(0))
        .map_err(|e| StorageError::Database(e.to_string()).into())
}
