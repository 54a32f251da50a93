//! Database schema definitions and migrations.
//!
//! Provides versioned, idempotent schema migrations. Every statement is
//! create-if-absent, so running them against an existing database is safe.

use rusqlite::Connection;

use crate::error::StorageError;
use crate::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Tables that must exist after migration.
const EXPECTED_TABLES: [&str; 6] = [
    "catalog_entry",
    "entry_history",
    "category_tag",
    "quote",
    "author",
    "schema_migrations",
];

/// Run all pending migrations.
///
/// # Errors
///
/// Returns an error if migrations fail.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| StorageError::Migration(format!("failed to create migrations table: {e}")))?;

    let current_version = get_current_version(conn)?;
    tracing::info!(
        current = current_version,
        target = SCHEMA_VERSION,
        "Checking database migrations"
    );

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Get the current schema version.
fn get_current_version(conn: &Connection) -> Result<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| StorageError::Migration(format!("failed to get version: {e}")).into())
}

/// Record a migration as applied.
fn record_migration(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)",
        rusqlite::params![version, chrono::Utc::now().timestamp()],
    )
    .map_err(|e| StorageError::Migration(format!("failed to record migration: {e}")))?;

    Ok(())
}

/// Migration v1: catalog, history, tags and the quote/author tables.
fn migrate_v1(conn: &Connection) -> Result<()> {
    tracing::info!("Applying migration v1: Initial schema");

    conn.execute_batch(
        r"
        -- Current state, one row per external id
        CREATE TABLE IF NOT EXISTS catalog_entry (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id TEXT NOT NULL UNIQUE,
            category TEXT,
            title TEXT,
            summary TEXT,
            image_ref TEXT,
            source_link TEXT,
            kind TEXT,
            availability INTEGER NOT NULL DEFAULT 0,
            summary_embedding BLOB
        );

        -- Append-only observations of volatile fields
        CREATE TABLE IF NOT EXISTS entry_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_ref INTEGER NOT NULL REFERENCES catalog_entry(id),
            rating INTEGER,
            price INTEGER,
            stock_level INTEGER,
            tax_amount INTEGER,
            review_count INTEGER,
            observed_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_entry_history_entry_observed
            ON entry_history(entry_ref, observed_at);

        CREATE TABLE IF NOT EXISTS category_tag (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS quote (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content TEXT NOT NULL,
            author TEXT NOT NULL,
            tags TEXT,
            observed_at INTEGER,
            UNIQUE(content, author)
        );

        CREATE TABLE IF NOT EXISTS author (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            slug TEXT NOT NULL UNIQUE,
            name TEXT,
            link TEXT
        );
        ",
    )
    .map_err(|e| StorageError::Migration(format!("v1 migration failed: {e}")))?;

    record_migration(conn, 1)?;
    tracing::info!("Migration v1 complete");

    Ok(())
}

/// Verify all expected tables exist.
///
/// # Errors
///
/// Returns an error if any expected table is missing from the schema.
pub fn verify_schema(conn: &Connection) -> Result<()> {
    for table in EXPECTED_TABLES {
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?",
                [table],
                |_| Ok(true),
            )
            .unwrap_or(false);

        if !exists {
            return Err(StorageError::Migration(format!("table '{table}' not found")).into());
        }
    }

    tracing::debug!("Schema verification passed");
    Ok(())
}
