//! Refresh orchestration
//!
//! A refresh pulls a feed, parses it and stores the result:
//!
//! - Routes: purge stale rows, load the ASN detail map, insert every
//!   requested family under generation `V+1`, carry the other family forward,
//!   flip the pointer, then retire `V`.
//! - Vendors: upsert every registry entry in batches.
//!
//! Each refresher owns a [`RefreshGuard`] backed by the repository's refresh
//! lease, so at most one cycle per dataset runs at a time across every
//! refresher and process sharing the store. A second caller gets
//! `RefreshError::AlreadyRunning` and the cycle is skipped, never queued.
//!
//! All refresh work is blocking I/O. Async callers run it through
//! `tokio::task::spawn_blocking` (see [`scheduler`]).

pub mod scheduler;

pub use scheduler::{DailySchedule, RefreshScheduler, SchedulerHandle};

use crate::database::{
    Generation, RefreshLease, RouteRecord, RouteRepository, VendorRepository, DEFAULT_LEASE_TTL,
};
use crate::datasets::{
    parse_asn_details, AsnDetail, AsnDetailMap, FeedFetcher, IpFamily, RouteLines, VendorLines,
};
use crate::error::RefreshError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_IPV4_ROUTES_URL: &str = "https://thyme.apnic.net/current/data-raw-table";
pub const DEFAULT_IPV6_ROUTES_URL: &str = "https://thyme.apnic.net/.combined/ipv6-raw-table";
pub const DEFAULT_ASN_DETAILS_URL: &str = "https://thyme.apnic.net/current/data-used-autnums";
pub const DEFAULT_OUI_URL: &str = "https://standards-oui.ieee.org/oui/oui.txt";

/// Records written per repository call
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 5000;

/// Single-flight guard for one dataset
///
/// The in-process flag turns away a second caller on the same refresher
/// without touching storage. The lease, held in the repository, turns away
/// every other refresher on the same store, including other processes.
pub struct RefreshGuard {
    dataset: &'static str,
    running: AtomicBool,
    lease: Arc<dyn RefreshLease>,
    lease_ttl: Duration,
}

/// Held for the duration of a cycle; releases the lease and the guard on drop
pub struct RefreshPermit<'a> {
    guard: &'a RefreshGuard,
    holder: String,
}

impl RefreshGuard {
    pub fn new(dataset: &'static str, lease: Arc<dyn RefreshLease>) -> Self {
        Self {
            dataset,
            running: AtomicBool::new(false),
            lease,
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn try_acquire(&self) -> Result<RefreshPermit<'_>, RefreshError> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RefreshError::AlreadyRunning(self.dataset))?;

        let holder = Uuid::new_v4().to_string();
        match self.lease.try_acquire(&holder, self.lease_ttl) {
            Ok(true) => Ok(RefreshPermit {
                guard: self,
                holder,
            }),
            Ok(false) => {
                self.running.store(false, Ordering::Release);
                info!("{} refresh lease is held elsewhere", self.dataset);
                Err(RefreshError::AlreadyRunning(self.dataset))
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for RefreshPermit<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.guard.lease.release(&self.holder) {
            warn!(
                "Failed to release {} refresh lease, it lapses on expiry: {}",
                self.guard.dataset, e
            );
        }
        self.guard.running.store(false, Ordering::Release);
    }
}

/// Locations of the three route feeds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteFeeds {
    pub ipv4: String,
    pub ipv6: String,
    pub asn_details: String,
}

impl RouteFeeds {
    pub fn routes(&self, family: IpFamily) -> &str {
        match family {
            IpFamily::V4 => &self.ipv4,
            IpFamily::V6 => &self.ipv6,
        }
    }
}

impl Default for RouteFeeds {
    fn default() -> Self {
        Self {
            ipv4: DEFAULT_IPV4_ROUTES_URL.to_string(),
            ipv6: DEFAULT_IPV6_ROUTES_URL.to_string(),
            asn_details: DEFAULT_ASN_DETAILS_URL.to_string(),
        }
    }
}

/// Outcome of a successful route refresh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteRefreshSummary {
    pub previous_generation: Generation,
    pub generation: Generation,
    pub families: Vec<IpFamily>,
    pub ipv4_inserted: u64,
    pub ipv6_inserted: u64,
    pub carried_forward: u64,
    pub purged: u64,
    pub retired: u64,
    pub skipped_lines: u64,
    /// Inserted routes whose ASN was missing from the detail feed
    pub unknown_asns: u64,
}

impl RouteRefreshSummary {
    pub fn inserted(&self) -> u64 {
        self.ipv4_inserted + self.ipv6_inserted
    }
}

impl fmt::Display for RouteRefreshSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "generation {} -> {}: {} ipv4 and {} ipv6 routes inserted, {} carried forward, \
             {} retired, {} purged, {} lines skipped, {} unknown ASNs",
            self.previous_generation,
            self.generation,
            self.ipv4_inserted,
            self.ipv6_inserted,
            self.carried_forward,
            self.retired,
            self.purged,
            self.skipped_lines,
            self.unknown_asns
        )
    }
}

/// Rebuilds the route dataset as a new generation
pub struct RouteRefresher {
    repository: Arc<dyn RouteRepository>,
    fetcher: Arc<dyn FeedFetcher>,
    feeds: RouteFeeds,
    batch_size: usize,
    guard: RefreshGuard,
}

struct FamilyLoad {
    inserted: u64,
    skipped: u64,
    unknown_asns: u64,
}

impl RouteRefresher {
    pub fn new(
        repository: Arc<dyn RouteRepository>,
        fetcher: Arc<dyn FeedFetcher>,
        feeds: RouteFeeds,
    ) -> Self {
        let guard = RefreshGuard::new("route", repository.refresh_lease());
        Self {
            repository,
            fetcher,
            feeds,
            batch_size: DEFAULT_INSERT_BATCH_SIZE,
            guard,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// How long a claimed lease survives a refresher that never releases it
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.guard = self.guard.with_lease_ttl(ttl);
        self
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Refresh both families
    pub fn refresh_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RouteRefreshSummary, RefreshError> {
        self.refresh(&IpFamily::all(), cancel)
    }

    /// Refresh the given families; an empty slice means all of them
    ///
    /// On any error before the pointer flip the current generation stays
    /// live and untouched. Rows already written for `V+1` are left behind
    /// and purged at the start of the next cycle.
    pub fn refresh(
        &self,
        families: &[IpFamily],
        cancel: &CancellationToken,
    ) -> Result<RouteRefreshSummary, RefreshError> {
        let _permit = self.guard.try_acquire()?;

        let requested: Vec<IpFamily> = IpFamily::all()
            .into_iter()
            .filter(|f| families.is_empty() || families.contains(f))
            .collect();

        let current = self.repository.current_generation()?;
        let next = current + 1;
        let mut summary = RouteRefreshSummary {
            previous_generation: current,
            generation: next,
            families: requested.clone(),
            ..Default::default()
        };

        summary.purged = self.repository.purge_except(current)?;
        if summary.purged > 0 {
            info!(
                "Purged {} stale route rows outside generation {}",
                summary.purged, current
            );
        }

        info!("Loading ASN details from {}", self.feeds.asn_details);
        let mut stream = self.fetcher.fetch(&self.feeds.asn_details)?;
        let details = parse_asn_details(&mut stream)?;
        drop(stream);

        for family in IpFamily::all() {
            if requested.contains(&family) {
                let load = self.load_family(family, next, &details, cancel)?;
                match family {
                    IpFamily::V4 => summary.ipv4_inserted = load.inserted,
                    IpFamily::V6 => summary.ipv6_inserted = load.inserted,
                }
                summary.skipped_lines += load.skipped;
                summary.unknown_asns += load.unknown_asns;
            } else if current > 0 {
                let copied = self.repository.copy_family(current, next, family)?;
                info!(
                    "Carried {} {} routes forward into generation {}",
                    copied, family, next
                );
                summary.carried_forward += copied;
            }
        }

        if cancel.is_cancelled() {
            return Err(RefreshError::Cancelled("route"));
        }

        self.repository.set_current_generation(next)?;
        info!("Route generation {} is now current", next);

        if current > 0 {
            match self.repository.remove_generation(current) {
                Ok(removed) => summary.retired = removed,
                Err(e) => warn!(
                    "Failed to retire route generation {}, will purge next cycle: {}",
                    current, e
                ),
            }
        }

        info!("Route refresh complete, {}", summary);
        Ok(summary)
    }

    fn load_family(
        &self,
        family: IpFamily,
        generation: Generation,
        details: &AsnDetailMap,
        cancel: &CancellationToken,
    ) -> Result<FamilyLoad, RefreshError> {
        let location = self.feeds.routes(family);
        info!("Loading {} routes from {}", family, location);

        let stream = self.fetcher.fetch(location)?;
        let mut lines = RouteLines::new(stream, family);
        let unknown = AsnDetail::unknown();
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut load = FamilyLoad {
            inserted: 0,
            skipped: 0,
            unknown_asns: 0,
        };

        for route in lines.by_ref() {
            let route = route?;
            let detail = match details.get(&route.asn) {
                Some(detail) => detail,
                None => {
                    load.unknown_asns += 1;
                    &unknown
                }
            };
            batch.push(RouteRecord::new(generation, &route, detail));

            if batch.len() >= self.batch_size {
                load.inserted += self.flush(&mut batch, cancel)?;
            }
        }
        load.inserted += self.flush(&mut batch, cancel)?;
        load.skipped = lines.skipped() as u64;

        info!(
            "Inserted {} {} routes into generation {} ({} lines skipped)",
            load.inserted, family, generation, load.skipped
        );
        Ok(load)
    }

    fn flush(
        &self,
        batch: &mut Vec<RouteRecord>,
        cancel: &CancellationToken,
    ) -> Result<u64, RefreshError> {
        if cancel.is_cancelled() {
            return Err(RefreshError::Cancelled("route"));
        }
        if batch.is_empty() {
            return Ok(0);
        }
        self.repository.insert_batch(batch)?;
        let written = batch.len() as u64;
        batch.clear();
        Ok(written)
    }
}

/// Outcome of a successful vendor refresh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VendorRefreshSummary {
    pub upserted: u64,
    pub skipped_lines: u64,
    pub total: u64,
}

impl fmt::Display for VendorRefreshSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vendors upserted, {} lines skipped, {} vendors stored",
            self.upserted, self.skipped_lines, self.total
        )
    }
}

/// Merges the MAC vendor registry into the vendor repository
pub struct VendorRefresher {
    repository: Arc<dyn VendorRepository>,
    fetcher: Arc<dyn FeedFetcher>,
    location: String,
    batch_size: usize,
    guard: RefreshGuard,
}

impl VendorRefresher {
    pub fn new(
        repository: Arc<dyn VendorRepository>,
        fetcher: Arc<dyn FeedFetcher>,
        location: impl Into<String>,
    ) -> Self {
        let guard = RefreshGuard::new("vendor", repository.refresh_lease());
        Self {
            repository,
            fetcher,
            location: location.into(),
            batch_size: DEFAULT_INSERT_BATCH_SIZE,
            guard,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// How long a claimed lease survives a refresher that never releases it
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.guard = self.guard.with_lease_ttl(ttl);
        self
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Upsert every registry entry
    ///
    /// Each upsert stands on its own, so a cycle that fails or is cancelled
    /// partway leaves earlier batches applied.
    pub fn refresh(
        &self,
        cancel: &CancellationToken,
    ) -> Result<VendorRefreshSummary, RefreshError> {
        let _permit = self.guard.try_acquire()?;

        info!("Loading MAC vendors from {}", self.location);
        let stream = self.fetcher.fetch(&self.location)?;
        let mut lines = VendorLines::new(stream);
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut summary = VendorRefreshSummary::default();

        for entry in lines.by_ref() {
            batch.push(entry?);
            if batch.len() >= self.batch_size {
                if cancel.is_cancelled() {
                    return Err(RefreshError::Cancelled("vendor"));
                }
                summary.upserted += self.repository.set_many(&batch)?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            if cancel.is_cancelled() {
                return Err(RefreshError::Cancelled("vendor"));
            }
            summary.upserted += self.repository.set_many(&batch)?;
        }

        summary.skipped_lines = lines.skipped() as u64;
        summary.total = self.repository.count()?;
        info!("Vendor refresh complete, {}", summary);
        Ok(summary)
    }
}
