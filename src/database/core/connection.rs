//! Database connection management
//!
//! This module provides the core database connection wrapper used by the
//! SQLite repositories.

use crate::error::RepositoryError;
use rusqlite::Connection;
use std::time::Duration;

/// How long a writer or reader waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Core database connection wrapper
///
/// `DatabaseConn` provides a thin wrapper around SQLite connections,
/// handling both file-based and in-memory databases with consistent
/// configuration and error handling.
pub struct DatabaseConn {
    pub conn: Connection,
}

impl DatabaseConn {
    /// Open a database at the specified path
    ///
    /// If the path is `None`, an in-memory database is created.
    pub fn open(path: Option<&str>) -> Result<Self, RepositoryError> {
        let conn = match path {
            Some(p) => Connection::open(p).map_err(|source| RepositoryError::Open {
                path: p.to_string(),
                source,
            })?,
            None => Connection::open_in_memory().map_err(|source| RepositoryError::Open {
                path: ":memory:".to_string(),
                source,
            })?,
        };

        let db = DatabaseConn { conn };
        db.configure()?;
        Ok(db)
    }

    /// Open a database at the specified path (convenience method)
    pub fn open_path(path: &str) -> Result<Self, RepositoryError> {
        Self::open(Some(path))
    }

    /// Create an in-memory database
    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        Self::open(None)
    }

    fn configure(&self) -> Result<(), RepositoryError> {
        // WAL lets readers keep querying the current generation while a
        // refresh writes the next one
        let _: String = self
            .conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        self.conn.execute("PRAGMA synchronous=NORMAL", [])?;
        self.conn.execute("PRAGMA temp_store=MEMORY", [])?;
        self.conn.busy_timeout(BUSY_TIMEOUT)?;

        Ok(())
    }

    /// Execute a SQL statement
    pub fn execute(&self, sql: &str) -> Result<usize, RepositoryError> {
        Ok(self.conn.execute(sql, [])?)
    }

    /// Begin an unchecked transaction
    pub fn transaction(&self) -> Result<rusqlite::Transaction<'_>, RepositoryError> {
        Ok(self.conn.unchecked_transaction()?)
    }

    /// Check if a table exists in the database
    pub fn table_exists(&self, table_name: &str) -> Result<bool, RepositoryError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get the row count for a table
    pub fn table_count(&self, table_name: &str) -> Result<u64, RepositoryError> {
        let query = format!("SELECT COUNT(*) FROM {}", table_name);
        let count: i64 = self.conn.query_row(&query, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
