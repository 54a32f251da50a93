//! `SQLite` connection management.
//!
//! Owns the single live connection used by one ingestion worker and
//! provides:
//! - Liveness checks with a single transparent reconnect
//! - Immediate transactions with rollback on failure
//! - An explicit lifetime (open at pipeline start, close at pipeline end)

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StorageError;
use crate::telemetry::metrics::RECONNECTS_TOTAL;
use crate::Result;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
enum Target {
    File(PathBuf),
    Memory,
}

/// Connection manager for the relational store.
///
/// Holds at most one connection. Callers invoke [`Database::ensure_connection`]
/// before each unit of work; it replaces a closed or stale connection with a
/// fresh one, trying exactly once.
pub struct Database {
    conn: Mutex<Option<Connection>>,
    target: Target,
}

impl Database {
    /// Open a database at the given path.
    ///
    /// Creates the database file and parent directories if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the database cannot be opened
    /// or configured.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let target = Target::File(path.as_ref().to_path_buf());
        let conn = connect(&target)?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            target,
        })
    }

    /// Open an in-memory database for testing.
    ///
    /// Reconnecting an in-memory database yields a new, empty database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open_in_memory() -> Result<Self> {
        let target = Target::Memory;
        let conn = connect(&target)?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            target,
        })
    }

    /// Guarantee a usable connection for the caller's next operation.
    ///
    /// A connection that is missing, fails a `SELECT 1` check, or was left
    /// inside an open transaction is dropped and reopened once.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the reconnect attempt fails.
    pub fn ensure_connection(&self) -> Result<()> {
        let mut guard = self.conn.lock();

        let stale_reason = match guard.as_ref() {
            None => Some("no open connection".to_string()),
            Some(conn) if !conn.is_autocommit() => Some("transaction left open".to_string()),
            Some(conn) => conn
                .query_row("SELECT 1", [], |_| Ok(()))
                .err()
                .map(|e| format!("liveness check failed: {e}")),
        };

        let Some(reason) = stale_reason else {
            return Ok(());
        };

        tracing::warn!(path = %self.path(), %reason, "Reconnecting to database");
        // Drop the stale handle before reopening so file locks are released.
        drop(guard.take());

        match connect(&self.target) {
            Ok(conn) => {
                *guard = Some(conn);
                RECONNECTS_TOTAL.inc();
                tracing::info!(path = %self.path(), "Reconnected to database");
                Ok(())
            }
            Err(e) => {
                tracing::error!(path = %self.path(), error = %e, "Reconnection failed");
                Err(e)
            }
        }
    }

    /// Execute a function with exclusive database access.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if no connection is held, or the
    /// error returned by the function.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| StorageError::Connection("connection is closed".to_string()))?;
        f(conn)
    }

    /// Execute a function inside an immediate transaction.
    ///
    /// Commits if the function succeeds; rolls back everything it wrote if
    /// the function or the commit fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot be started or committed,
    /// or if the function fails.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.with_conn(|conn| {
            conn.execute_batch("BEGIN IMMEDIATE")
                .map_err(|e| StorageError::Database(format!("failed to begin transaction: {e}")))?;

            let outcome = f(conn).and_then(|value| {
                conn.execute_batch("COMMIT")
                    .map_err(|e| StorageError::Database(format!("failed to commit: {e}")))?;
                Ok(value)
            });

            if outcome.is_err() && !conn.is_autocommit() {
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    tracing::error!(error = %e, "Rollback failed");
                }
            }
            outcome
        })
    }

    /// Release the held connection.
    ///
    /// A later [`Database::ensure_connection`] opens a new one.
    pub fn close(&self) {
        if let Some(conn) = self.conn.lock().take() {
            if let Err((_, e)) = conn.close() {
                tracing::warn!(path = %self.path(), error = %e, "Error while closing database");
            }
            tracing::info!(path = %self.path(), "Disconnected from database");
        }
    }

    /// Whether a connection is currently held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Get the database path.
    #[must_use]
    pub fn path(&self) -> String {
        match &self.target {
            Target::File(path) => path.display().to_string(),
            Target::Memory => ":memory:".to_string(),
        }
    }

    /// Check if the database is healthy.
    ///
    /// # Errors
    ///
    /// Returns an error if the health check fails.
    pub fn health_check(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| StorageError::Database(format!("health check failed: {e}")).into())
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Open and configure a connection to `target`.
fn connect(target: &Target) -> Result<Connection> {
    let conn = match target {
        Target::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Connection(format!(
                        "failed to create directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        }
        Target::Memory => Connection::open_in_memory(),
    }
    .map_err(|e| StorageError::Connection(format!("failed to open database: {e}")))?;

    configure(&conn, target)?;
    Ok(conn)
}

fn configure(conn: &Connection, target: &Target) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| StorageError::Connection(format!("failed to set busy timeout: {e}")))?;

    let pragmas = match target {
        Target::File(_) => {
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "
        }
        Target::Memory => "PRAGMA foreign_keys = ON;",
    };

    conn.execute_batch(pragmas)
        .map_err(|e| StorageError::Connection(format!("failed to configure database: {e}")))?;

    tracing::debug!(?target, "Database connection configured");
    Ok(())
}
