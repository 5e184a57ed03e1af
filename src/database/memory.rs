//! In-memory repositories
//!
//! Same contracts as the SQLite backends, held behind `RwLock`s. Used for
//! deterministic tests and for running without a database file.

use crate::database::lease::{MemoryRefreshLease, RefreshLease};
use crate::database::routes::{sort_routes, Generation, RouteRecord, RouteRepository};
use crate::database::vendors::{VendorRecord, VendorRepository};
use crate::datasets::IpFamily;
use crate::error::{LookupError, RepositoryError};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
struct RouteState {
    current: Generation,
    records: Vec<RouteRecord>,
}

/// Route repository backed by a vector of records
#[derive(Default)]
pub struct MemoryRouteRepository {
    state: RwLock<RouteState>,
    lease: Arc<MemoryRefreshLease>,
}

impl MemoryRouteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RouteState>, RepositoryError> {
        self.state.read().map_err(|_| RepositoryError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RouteState>, RepositoryError> {
        self.state.write().map_err(|_| RepositoryError::Poisoned)
    }

    /// Current-generation records matching `filter`, in lookup order
    ///
    /// The pointer and the rows are read under one lock, so the result is a
    /// single generation.
    fn select<F>(&self, filter: F) -> Result<Vec<RouteRecord>, RepositoryError>
    where
        F: Fn(&RouteRecord) -> bool,
    {
        let state = self.read()?;
        let mut found: Vec<RouteRecord> = state
            .records
            .iter()
            .filter(|r| r.generation == state.current && filter(r))
            .cloned()
            .collect();
        sort_routes(&mut found);
        Ok(found)
    }
}

impl RouteRepository for MemoryRouteRepository {
    fn current_generation(&self) -> Result<Generation, RepositoryError> {
        Ok(self.read()?.current)
    }

    fn set_current_generation(&self, generation: Generation) -> Result<(), RepositoryError> {
        self.write()?.current = generation;
        Ok(())
    }

    fn insert_batch(&self, records: &[RouteRecord]) -> Result<(), RepositoryError> {
        let mut state = self.write()?;
        if let Some(dup) = records
            .iter()
            .find(|r| state.records.iter().any(|existing| existing.id == r.id))
        {
            return Err(RepositoryError::Backend(format!(
                "duplicate route id {}",
                dup.id
            )));
        }
        state.records.extend_from_slice(records);
        Ok(())
    }

    fn copy_family(
        &self,
        from: Generation,
        to: Generation,
        family: IpFamily,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.write()?;
        let copied: Vec<RouteRecord> = state
            .records
            .iter()
            .filter(|r| r.generation == from && r.family() == family)
            .map(|r| RouteRecord {
                id: Uuid::new_v4(),
                generation: to,
                ..r.clone()
            })
            .collect();
        let count = copied.len() as u64;
        state.records.extend(copied);
        Ok(count)
    }

    fn remove_generation(&self, generation: Generation) -> Result<u64, RepositoryError> {
        let mut state = self.write()?;
        let before = state.records.len();
        state.records.retain(|r| r.generation != generation);
        Ok((before - state.records.len()) as u64)
    }

    fn purge_except(&self, keep: Generation) -> Result<u64, RepositoryError> {
        let mut state = self.write()?;
        let before = state.records.len();
        state.records.retain(|r| r.generation == keep);
        Ok((before - state.records.len()) as u64)
    }

    fn count_generation(
        &self,
        generation: Generation,
        family: Option<IpFamily>,
    ) -> Result<u64, RepositoryError> {
        let state = self.read()?;
        let count = state
            .records
            .iter()
            .filter(|r| r.generation == generation)
            .filter(|r| family.is_none_or(|f| r.family() == f))
            .count();
        Ok(count as u64)
    }

    fn by_asn(&self, asn: u32) -> Result<Vec<RouteRecord>, RepositoryError> {
        self.select(|r| r.asn == asn)
    }

    fn by_ipv4(&self, addr: Ipv4Addr) -> Result<Vec<RouteRecord>, RepositoryError> {
        self.select(|r| r.bounds.contains_ipv4(addr))
    }

    fn by_ipv6(&self, addr: Ipv6Addr) -> Result<Vec<RouteRecord>, RepositoryError> {
        self.select(|r| r.bounds.contains_ipv6(addr))
    }

    fn by_owner(&self, needle: &str) -> Result<Vec<RouteRecord>, RepositoryError> {
        let needle = needle.to_lowercase();
        self.select(|r| r.owner.to_lowercase().contains(&needle))
    }

    fn refresh_lease(&self) -> Arc<dyn RefreshLease> {
        self.lease.clone()
    }
}

/// Vendor repository keyed by prefix
#[derive(Default)]
pub struct MemoryVendorRepository {
    records: RwLock<BTreeMap<String, VendorRecord>>,
    lease: Arc<MemoryRefreshLease>,
}

impl MemoryVendorRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VendorRepository for MemoryVendorRepository {
    fn get(
        &self,
        prefix_pattern: &str,
        company_pattern: &str,
    ) -> Result<Vec<VendorRecord>, LookupError> {
        let records = self.records.read().map_err(|_| RepositoryError::Poisoned)?;
        let prefix_pattern_upper = prefix_pattern.to_uppercase();
        let company_pattern_lower = company_pattern.to_lowercase();

        let found: Vec<VendorRecord> = records
            .values()
            .filter(|r| {
                r.prefix.to_uppercase().starts_with(&prefix_pattern_upper)
                    || r.company_name.to_lowercase().contains(&company_pattern_lower)
            })
            .cloned()
            .collect();

        if found.is_empty() {
            return Err(LookupError::NotFound(prefix_pattern.to_string()));
        }
        Ok(found)
    }

    fn set(&self, prefix: &str, company: &str) -> Result<(), RepositoryError> {
        let mut records = self.records.write().map_err(|_| RepositoryError::Poisoned)?;
        let next_id = records.len() as i64 + 1;
        records
            .entry(prefix.to_string())
            .and_modify(|r| r.company_name = company.to_string())
            .or_insert_with(|| VendorRecord {
                id: next_id,
                prefix: prefix.to_string(),
                company_name: company.to_string(),
            });
        Ok(())
    }

    fn count(&self) -> Result<u64, RepositoryError> {
        let records = self.records.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(records.len() as u64)
    }

    fn refresh_lease(&self) -> Arc<dyn RefreshLease> {
        self.lease.clone()
    }
}
