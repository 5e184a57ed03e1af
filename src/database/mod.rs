//! Database module
//!
//! This module provides all storage for refdex, organized into:
//!
//! - **core**: Core database infrastructure (SQLite connections, schema management)
//! - **routes**: Versioned route records and the generation pointer
//! - **vendors**: MAC vendor records keyed by OUI
//! - **memory**: In-memory implementations of both repository contracts
//! - **lease**: Per-dataset refresh leases shared by every process on one file
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/           # Foundation
//! │   ├── connection  # SQLite DatabaseConn wrapper
//! │   └── schema      # SQLite schema definitions and management
//! │
//! ├── routes          # RouteRepository + SQLite backend
//! ├── vendors         # VendorRepository + SQLite backend
//! ├── lease           # RefreshLease + SQLite and in-memory backends
//! └── memory          # RwLock-backed backends
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use refdex::database::{RefdexDatabase, RouteRepository};
//!
//! let db = RefdexDatabase::open_in_dir("~/.refdex")?;
//! let routes = db.routes();
//! let found = routes.by_asn(13335)?;
//! ```
//!
//! Repositories are consumed through `Arc<dyn RouteRepository>` and
//! `Arc<dyn VendorRepository>` so the refresh and lookup code never names a
//! backend.

pub mod core;
pub mod lease;
pub mod memory;
pub mod routes;
pub mod vendors;

pub use core::{DatabaseConn, SchemaDefinitions, SchemaManager, SchemaStatus, SCHEMA_VERSION};
pub use lease::{MemoryRefreshLease, RefreshLease, SqliteRefreshLease, DEFAULT_LEASE_TTL};
pub use memory::{MemoryRouteRepository, MemoryVendorRepository};
pub use routes::{Generation, RouteBounds, RouteRecord, RouteRepository, SqliteRouteRepository};
pub use vendors::{SqliteVendorRepository, VendorRecord, VendorRepository};

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Database file name inside the data directory
pub const DATABASE_FILE: &str = "refdex-data.sqlite3";

/// Main refdex database (SQLite backend)
///
/// Opening it makes sure the schema is present and current. Schema drift is
/// handled by resetting: the data is reference data and the next refresh
/// repopulates it.
#[derive(Debug, Clone)]
pub struct RefdexDatabase {
    path: PathBuf,
}

impl RefdexDatabase {
    /// Open the refdex database at the specified path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = DatabaseConn::open_path(&path.to_string_lossy())
            .map_err(|e| anyhow!("Failed to open database: {}", e))?;
        let schema = SchemaManager::new(&db.conn);

        match schema.check_status()? {
            SchemaStatus::Current => {
                info!("Refdex database schema is current");
            }
            SchemaStatus::NotInitialized => {
                info!("Initializing refdex database schema");
                schema.initialize()?;
            }
            SchemaStatus::NeedsMigration { from, to } => {
                info!("Refdex database needs migration from v{} to v{}", from, to);
                schema.reset()?;
                schema.initialize()?;
            }
            SchemaStatus::Incompatible {
                database_version,
                required_version,
            } => {
                info!(
                    "Refdex database schema incompatible (db: v{}, required: v{}), resetting",
                    database_version, required_version
                );
                schema.reset()?;
                schema.initialize()?;
            }
            SchemaStatus::Corrupted => {
                info!("Refdex database schema corrupted, resetting");
                schema.reset()?;
                schema.initialize()?;
            }
        }

        Ok(Self { path })
    }

    /// Open the refdex database from a data directory
    ///
    /// Creates the directory if needed and uses `{data_dir}/refdex-data.sqlite3`.
    pub fn open_in_dir(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir).map_err(|e| {
            anyhow!(
                "Failed to create data directory '{}': {}",
                data_dir.display(),
                e
            )
        })?;
        Self::open(data_dir.join(DATABASE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn routes(&self) -> SqliteRouteRepository {
        SqliteRouteRepository::new(&self.path)
    }

    pub fn vendors(&self) -> SqliteVendorRepository {
        SqliteVendorRepository::new(&self.path)
    }
}
