//! Refresh leases
//!
//! A lease is a single row per dataset naming the refresher that currently
//! owns the refresh and when its claim lapses. Every process that opens the
//! same database file competes for the same row, so two `refdex` processes
//! (or a scheduler and a one-shot `refdex refresh`) never build the same
//! generation at once.
//!
//! A holder that dies without releasing blocks the dataset until the lease
//! expires.

use crate::database::core::DatabaseConn;
use crate::error::RepositoryError;
use chrono::Utc;
use rusqlite::{params, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default lifetime of a claimed lease
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// Exclusive, expiring claim on refreshing one dataset
pub trait RefreshLease: Send + Sync {
    /// Claim the lease for `holder` unless another holder has an unexpired claim
    ///
    /// Returns `Ok(false)` when the lease is held elsewhere.
    fn try_acquire(&self, holder: &str, ttl: Duration) -> Result<bool, RepositoryError>;

    /// Give the lease up if `holder` still owns it
    fn release(&self, holder: &str) -> Result<(), RepositoryError>;
}

const CLAIM_SQL: &str = "INSERT INTO refresh_lease (dataset, holder, expires_at) VALUES (?1, ?2, ?3)
     ON CONFLICT(dataset) DO UPDATE SET holder = excluded.holder, expires_at = excluded.expires_at
     WHERE refresh_lease.expires_at <= ?4";

/// Lease stored in the `refresh_lease` table
#[derive(Debug, Clone)]
pub struct SqliteRefreshLease {
    path: PathBuf,
    dataset: &'static str,
}

impl SqliteRefreshLease {
    pub fn new(path: impl AsRef<Path>, dataset: &'static str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            dataset,
        }
    }

    fn connect(&self) -> Result<DatabaseConn, RepositoryError> {
        DatabaseConn::open_path(&self.path.to_string_lossy())
    }
}

impl RefreshLease for SqliteRefreshLease {
    fn try_acquire(&self, holder: &str, ttl: Duration) -> Result<bool, RepositoryError> {
        let now = Utc::now().timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl_secs);

        let mut db = self.connect()?;
        // BEGIN IMMEDIATE takes the write lock up front, so the expiry check
        // and the claim cannot interleave with another process
        let tx = db
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(CLAIM_SQL, params![self.dataset, holder, expires_at, now])?;
        tx.commit()?;

        Ok(changed == 1)
    }

    fn release(&self, holder: &str) -> Result<(), RepositoryError> {
        let db = self.connect()?;
        db.conn.execute(
            "DELETE FROM refresh_lease WHERE dataset = ?1 AND holder = ?2",
            params![self.dataset, holder],
        )?;
        Ok(())
    }
}

/// Lease held in process memory
///
/// Shared by every refresher handed the same in-memory repository.
#[derive(Debug, Default)]
pub struct MemoryRefreshLease {
    claim: Mutex<Option<(String, Instant)>>,
}

impl MemoryRefreshLease {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<(String, Instant)>>, RepositoryError> {
        self.claim.lock().map_err(|_| RepositoryError::Poisoned)
    }
}

impl RefreshLease for MemoryRefreshLease {
    fn try_acquire(&self, holder: &str, ttl: Duration) -> Result<bool, RepositoryError> {
        let mut claim = self.lock()?;
        let now = Instant::now();

        if let Some((_, expires_at)) = claim.as_ref() {
            if *expires_at > now {
                return Ok(false);
            }
        }

        let expires_at = now.checked_add(ttl).unwrap_or(now);
        *claim = Some((holder.to_string(), expires_at));
        Ok(true)
    }

    fn release(&self, holder: &str) -> Result<(), RepositoryError> {
        let mut claim = self.lock()?;
        if claim.as_ref().is_some_and(|(owner, _)| owner == holder) {
            *claim = None;
        }
        Ok(())
    }
}
