use refdex::database::{
    Generation, MemoryRouteRepository, MemoryVendorRepository, RefreshLease, RouteRecord,
    RouteRepository, VendorRecord, VendorRepository,
};
use refdex::datasets::{IpFamily, VendorLine};
use refdex::{LookupError, RepositoryError};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// Failure-injecting RouteRepository
// ============================================================================

/// Wraps an in-memory repository and fails selected writes on demand
pub struct FailingRouteRepository {
    inner: Arc<MemoryRouteRepository>,
    /// `insert_batch` calls allowed before failing; `u64::MAX` never fails
    batches_before_failure: AtomicU64,
    batch_calls: AtomicU64,
    fail_remove: AtomicBool,
}

impl FailingRouteRepository {
    pub fn new(inner: Arc<MemoryRouteRepository>) -> Self {
        Self {
            inner,
            batches_before_failure: AtomicU64::new(u64::MAX),
            batch_calls: AtomicU64::new(0),
            fail_remove: AtomicBool::new(false),
        }
    }

    pub fn fail_inserts_after(&self, batches: u64) {
        self.batch_calls.store(0, Ordering::SeqCst);
        self.batches_before_failure.store(batches, Ordering::SeqCst);
    }

    pub fn fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.batches_before_failure.store(u64::MAX, Ordering::SeqCst);
        self.fail_remove.store(false, Ordering::SeqCst);
    }
}

impl RouteRepository for FailingRouteRepository {
    fn current_generation(&self) -> Result<Generation, RepositoryError> {
        self.inner.current_generation()
    }

    fn set_current_generation(&self, generation: Generation) -> Result<(), RepositoryError> {
        self.inner.set_current_generation(generation)
    }

    fn insert_batch(&self, records: &[RouteRecord]) -> Result<(), RepositoryError> {
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.batches_before_failure.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("disk full".to_string()));
        }
        self.inner.insert_batch(records)
    }

    fn copy_family(
        &self,
        from: Generation,
        to: Generation,
        family: IpFamily,
    ) -> Result<u64, RepositoryError> {
        self.inner.copy_family(from, to, family)
    }

    fn remove_generation(&self, generation: Generation) -> Result<u64, RepositoryError> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("database is locked".to_string()));
        }
        self.inner.remove_generation(generation)
    }

    fn purge_except(&self, keep: Generation) -> Result<u64, RepositoryError> {
        self.inner.purge_except(keep)
    }

    fn count_generation(
        &self,
        generation: Generation,
        family: Option<IpFamily>,
    ) -> Result<u64, RepositoryError> {
        self.inner.count_generation(generation, family)
    }

    fn by_asn(&self, asn: u32) -> Result<Vec<RouteRecord>, RepositoryError> {
        self.inner.by_asn(asn)
    }

    fn by_ipv4(&self, addr: Ipv4Addr) -> Result<Vec<RouteRecord>, RepositoryError> {
        self.inner.by_ipv4(addr)
    }

    fn by_ipv6(&self, addr: Ipv6Addr) -> Result<Vec<RouteRecord>, RepositoryError> {
        self.inner.by_ipv6(addr)
    }

    fn by_owner(&self, needle: &str) -> Result<Vec<RouteRecord>, RepositoryError> {
        self.inner.by_owner(needle)
    }

    fn refresh_lease(&self) -> Arc<dyn RefreshLease> {
        self.inner.refresh_lease()
    }
}

// ============================================================================
// Failure-injecting VendorRepository
// ============================================================================

/// Wraps an in-memory vendor repository and fails batch upserts on demand
pub struct FailingVendorRepository {
    inner: Arc<MemoryVendorRepository>,
    /// `set_many` calls allowed before failing; `u64::MAX` never fails
    batches_before_failure: AtomicU64,
    batch_calls: AtomicU64,
}

impl FailingVendorRepository {
    pub fn new(inner: Arc<MemoryVendorRepository>) -> Self {
        Self {
            inner,
            batches_before_failure: AtomicU64::new(u64::MAX),
            batch_calls: AtomicU64::new(0),
        }
    }

    pub fn fail_upserts_after(&self, batches: u64) {
        self.batch_calls.store(0, Ordering::SeqCst);
        self.batches_before_failure.store(batches, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.batches_before_failure.store(u64::MAX, Ordering::SeqCst);
    }
}

impl VendorRepository for FailingVendorRepository {
    fn get(
        &self,
        prefix_pattern: &str,
        company_pattern: &str,
    ) -> Result<Vec<VendorRecord>, LookupError> {
        self.inner.get(prefix_pattern, company_pattern)
    }

    fn set(&self, prefix: &str, company: &str) -> Result<(), RepositoryError> {
        self.inner.set(prefix, company)
    }

    fn set_many(&self, entries: &[VendorLine]) -> Result<u64, RepositoryError> {
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.batches_before_failure.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("disk full".to_string()));
        }
        self.inner.set_many(entries)
    }

    fn count(&self) -> Result<u64, RepositoryError> {
        self.inner.count()
    }

    fn refresh_lease(&self) -> Arc<dyn RefreshLease> {
        self.inner.refresh_lease()
    }
}
