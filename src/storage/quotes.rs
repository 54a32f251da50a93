//! Quote and author storage.
//!
//! Quotes are keyed on `(content, author)`; authors on `slug`. On conflict
//! only the mutable columns are rewritten, identity columns never change.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::models::{from_millis, to_millis, AuthorRow, QuoteRow};
use crate::error::StorageError;
use crate::Result;

/// Insert a quote, or refresh its tags and observation time.
///
/// Returns the row id.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub fn upsert_quote(
    conn: &Connection,
    content: &str,
    author: &str,
    tags: Option<&str>,
    observed_at: DateTime<Utc>,
) -> Result<i64> {
    conn.query_row(
        "INSERT INTO quote (content, author, tags, observed_at) VALUES (?, ?, ?, ?)
         ON CONFLICT(content, author) DO UPDATE SET
             tags = excluded.tags,
             observed_at = excluded.observed_at
         RETURNING id",
        params![content, author, tags, to_millis(observed_at)],
        |row| row.get(0),
    )
    .map_err(|e| StorageError::Database(format!("failed to upsert quote: {e}")).into())
}

/// Insert an author, or refresh its name and link.
///
/// Returns the row id.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub fn upsert_author(
    conn: &Connection,
    slug: &str,
    name: Option<&str>,
    link: Option<&str>,
) -> Result<i64> {
    conn.query_row(
        "INSERT INTO author (slug, name, link) VALUES (?, ?, ?)
         ON CONFLICT(slug) DO UPDATE SET
             name = excluded.name,
             link = excluded.link
         RETURNING id",
        params![slug, name, link],
        |row| row.get(0),
    )
    .map_err(|e| StorageError::Database(format!("failed to upsert author: {e}")).into())
}

/// Get a quote by its composite key.
///
/// # Errors
///
/// Returns an error if the quote is not found or the query fails.
pub fn get_quote(conn: &Connection, content: &str, author: &str) -> Result<QuoteRow> {
    conn.query_row(
        "SELECT id, content, author, tags, observed_at FROM quote
         WHERE content = ? AND author = ?",
        [content, author],
        |row| {
            Ok(QuoteRow {
                id: row.get(0)?,
                content: row.get(1)?,
                author: row.get(2)?,
                tags: row.get(3)?,
                observed_at: row.get::<_, Option<i64>>(4)?.map(from_millis),
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            StorageError::not_found("quote", format!("{author}: {content}")).into()
        }
        e => StorageError::Database(format!("failed to get quote: {e}")).into(),
    })
}

/// Get an author by slug.
///
/// # Errors
///
/// Returns an error if the author is not found or the query fails.
pub fn get_author(conn: &Connection, slug: &str) -> Result<AuthorRow> {
    conn.query_row(
        "SELECT id, slug, name, link FROM author WHERE slug = ?",
        [slug],
        |row| {
            Ok(AuthorRow {
                id: row.get(0)?,
                slug: row.get(1)?,
                name: row.get(2)?,
                link: row.get(3)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => StorageError::not_found("author", slug).into(),
        e => StorageError::Database(format!("failed to get author: {e}")).into(),
    })
}

/// Count quotes.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_quotes(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM quote", [], |row| row.get(0))
        .map_err(|e| StorageError::Database(e.to_string()).into())
}

/// Count authors.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_authors(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM author", [], |row| row.get(0))
        .map_err(|e| StorageError::Database(e.to_string()).into())
}
