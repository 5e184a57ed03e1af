//! Daily refresh scheduler
//!
//! Each dataset gets its own tokio task that sleeps until the next daily run
//! time (UTC) and then runs the refresher on the blocking pool. Shutdown
//! cancels the shared token: sleeping jobs stop right away, running cycles
//! notice the token between batches and abandon before cutover.

use crate::error::RefreshError;
use crate::refresh::{RouteRefresher, VendorRefresher};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A fixed time of day, in UTC, at which a job fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DailySchedule {
    time: NaiveTime,
}

impl DailySchedule {
    pub fn at(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(|time| Self { time })
    }

    /// First run strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.time).and_utc();
        if today > now {
            today
        } else {
            today + chrono::Duration::days(1)
        }
    }
}

impl Default for DailySchedule {
    fn default() -> Self {
        Self {
            time: NaiveTime::from_hms_opt(2, 0, 0).unwrap_or_default(),
        }
    }
}

impl FromStr for DailySchedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("Invalid time of day '{}'. Expected HH:MM (UTC)", s);
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        Self::at(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for DailySchedule {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DailySchedule> for String {
    fn from(value: DailySchedule) -> Self {
        value.time.format("%H:%M").to_string()
    }
}

impl fmt::Display for DailySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} UTC", self.time.format("%H:%M"))
    }
}

type RefreshJob = Arc<dyn Fn(CancellationToken) -> Result<String, RefreshError> + Send + Sync>;

/// Builder and launcher for the refresh jobs
///
/// ```rust,ignore
/// let handle = RefreshScheduler::new()
///     .with_routes(route_refresher, DailySchedule::default())
///     .with_vendors(vendor_refresher, DailySchedule::default())
///     .with_eager_refresh(true)
///     .start();
///
/// // ...
/// handle.shutdown(Duration::from_secs(30)).await;
/// ```
pub struct RefreshScheduler {
    jobs: Vec<(&'static str, DailySchedule, RefreshJob)>,
    eager: bool,
    shutdown: CancellationToken,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            eager: false,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_routes(
        mut self,
        refresher: Arc<RouteRefresher>,
        schedule: DailySchedule,
    ) -> Self {
        let job: RefreshJob = Arc::new(move |cancel: CancellationToken| {
            refresher.refresh_all(&cancel).map(|s| s.to_string())
        });
        self.jobs.push(("route", schedule, job));
        self
    }

    pub fn with_vendors(
        mut self,
        refresher: Arc<VendorRefresher>,
        schedule: DailySchedule,
    ) -> Self {
        let job: RefreshJob = Arc::new(move |cancel: CancellationToken| {
            refresher.refresh(&cancel).map(|s| s.to_string())
        });
        self.jobs.push(("vendor", schedule, job));
        self
    }

    /// Run every job once right after start, before its first scheduled time
    pub fn with_eager_refresh(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Spawn one task per job; must be called inside a tokio runtime
    pub fn start(self) -> SchedulerHandle {
        info!("Starting refresh scheduler with {} jobs", self.jobs.len());

        let tasks = self
            .jobs
            .into_iter()
            .map(|(name, schedule, job)| {
                spawn_job(name, schedule, self.eager, self.shutdown.clone(), job)
            })
            .collect();

        SchedulerHandle {
            shutdown: self.shutdown,
            tasks,
        }
    }
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_job(
    name: &'static str,
    schedule: DailySchedule,
    eager: bool,
    shutdown: CancellationToken,
    job: RefreshJob,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(job = name, schedule = %schedule, "Starting refresh job");

        if eager && !shutdown.is_cancelled() {
            run_once(name, &job, &shutdown).await;
        }

        loop {
            let now = Utc::now();
            let next = schedule.next_after(now);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(job = name, next_run = %next, "Next refresh scheduled");

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(job = name, "Refresh job shutting down");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    run_once(name, &job, &shutdown).await;
                }
            }
        }
    })
}

async fn run_once(name: &'static str, job: &RefreshJob, shutdown: &CancellationToken) {
    let job = Arc::clone(job);
    let token = shutdown.clone();

    match tokio::task::spawn_blocking(move || job(token)).await {
        Ok(Ok(summary)) => info!(job = name, "Refresh succeeded: {}", summary),
        Ok(Err(RefreshError::AlreadyRunning(_))) => {
            warn!(job = name, "Previous refresh still running, skipping this run")
        }
        Ok(Err(RefreshError::Cancelled(_))) => {
            info!(job = name, "Refresh abandoned on shutdown")
        }
        Ok(Err(e)) => error!(job = name, error = %e, "Refresh failed"),
        Err(e) => error!(job = name, error = %e, "Refresh task panicked"),
    }
}

/// Handle to the running jobs
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn job_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stop scheduling and wait for in-flight refreshes up to `grace`
    ///
    /// Returns `true` if every job finished within the grace period. Jobs
    /// still running afterwards are detached from the scheduler; a route
    /// refresh that never reached its cutover leaves only orphaned rows.
    pub async fn shutdown(self, grace: Duration) -> bool {
        info!("Stopping refresh scheduler (grace period {:?})", grace);
        self.shutdown.cancel();

        let aborts: Vec<AbortHandle> = self.tasks.iter().map(|t| t.abort_handle()).collect();
        match tokio::time::timeout(grace, futures::future::join_all(self.tasks)).await {
            Ok(_) => {
                info!("Refresh scheduler stopped");
                true
            }
            Err(_) => {
                warn!("Refresh jobs still running after {:?}, abandoning them", grace);
                for abort in aborts {
                    abort.abort();
                }
                false
            }
        }
    }
}
