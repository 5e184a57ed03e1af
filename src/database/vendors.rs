//! MAC vendor repository
//!
//! Vendor records are keyed by their 6-hex-digit OUI and upserted on every
//! sighting. There are no generations: the table only grows or updates, and
//! prefixes retired upstream are never removed.

use crate::database::core::DatabaseConn;
use crate::database::lease::{RefreshLease, SqliteRefreshLease};
use crate::database::routes::escape_like;
use crate::datasets::VendorLine;
use crate::error::{LookupError, RepositoryError};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A stored vendor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorRecord {
    pub id: i64,
    pub prefix: String,
    pub company_name: String,
}

/// Storage contract for vendor records
pub trait VendorRepository: Send + Sync {
    /// Records whose prefix starts with `prefix_pattern` or whose company name
    /// contains `company_pattern`, both case-insensitive
    ///
    /// An empty result is `LookupError::NotFound`.
    fn get(
        &self,
        prefix_pattern: &str,
        company_pattern: &str,
    ) -> Result<Vec<VendorRecord>, LookupError>;

    /// Insert the prefix, or overwrite its company name if it exists
    fn set(&self, prefix: &str, company: &str) -> Result<(), RepositoryError>;

    /// Upsert a batch of feed entries, returning how many were written
    fn set_many(&self, entries: &[VendorLine]) -> Result<u64, RepositoryError> {
        for entry in entries {
            self.set(&entry.prefix, &entry.company)?;
        }
        Ok(entries.len() as u64)
    }

    fn count(&self) -> Result<u64, RepositoryError>;

    /// Lease every vendor refresher against this store must hold
    fn refresh_lease(&self) -> Arc<dyn RefreshLease>;
}

const UPSERT_SQL: &str = "INSERT INTO mac_oui (prefix, company_name) VALUES (?1, ?2)
     ON CONFLICT(prefix) DO UPDATE SET company_name = excluded.company_name";

/// SQLite-backed vendor repository
#[derive(Debug, Clone)]
pub struct SqliteVendorRepository {
    path: PathBuf,
}

impl SqliteVendorRepository {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<DatabaseConn, RepositoryError> {
        DatabaseConn::open_path(&self.path.to_string_lossy())
    }
}

impl VendorRepository for SqliteVendorRepository {
    fn get(
        &self,
        prefix_pattern: &str,
        company_pattern: &str,
    ) -> Result<Vec<VendorRecord>, LookupError> {
        let db = self.connect()?;
        let mut stmt = db
            .conn
            .prepare(
                "SELECT id, prefix, company_name FROM mac_oui
                 WHERE prefix LIKE ?1 ESCAPE '\\' OR company_name LIKE ?2 ESCAPE '\\'
                 ORDER BY prefix",
            )
            .map_err(RepositoryError::from)?;

        let rows = stmt
            .query_map(
                params![
                    format!("{}%", escape_like(prefix_pattern)),
                    format!("%{}%", escape_like(company_pattern)),
                ],
                |row| {
                    Ok(VendorRecord {
                        id: row.get(0)?,
                        prefix: row.get(1)?,
                        company_name: row.get(2)?,
                    })
                },
            )
            .map_err(RepositoryError::from)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row.map_err(RepositoryError::from)?);
        }

        if results.is_empty() {
            return Err(LookupError::NotFound(prefix_pattern.to_string()));
        }
        Ok(results)
    }

    fn set(&self, prefix: &str, company: &str) -> Result<(), RepositoryError> {
        let db = self.connect()?;
        db.conn.execute(UPSERT_SQL, params![prefix, company])?;
        Ok(())
    }

    fn set_many(&self, entries: &[VendorLine]) -> Result<u64, RepositoryError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let db = self.connect()?;
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare(UPSERT_SQL)?;
            for entry in entries {
                stmt.execute(params![entry.prefix, entry.company])?;
            }
        }
        tx.commit()?;
        Ok(entries.len() as u64)
    }

    fn count(&self) -> Result<u64, RepositoryError> {
        let db = self.connect()?;
        db.table_count("mac_oui")
    }

    fn refresh_lease(&self) -> Arc<dyn RefreshLease> {
        Arc::new(SqliteRefreshLease::new(&self.path, "vendor"))
    }
}
