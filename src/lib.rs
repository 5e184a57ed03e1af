#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Refdex - versioned BGP route and MAC vendor reference data
//!
//! Refdex pulls public text feeds on a daily schedule, stores them in SQLite
//! and answers lookups against them. It can be used as both a command-line
//! application and a library.
//!
//! Two datasets are maintained:
//!
//! - **Routes**: announced IPv4/IPv6 prefixes with their origin ASN, owner
//!   name and country. Every refresh builds a complete new generation and
//!   then flips a single pointer, so readers always see one consistent
//!   snapshot.
//! - **Vendors**: MAC OUI prefixes and company names, merged in place by
//!   prefix.
//!
//! # Architecture
//!
//! - **[`datasets`]**: feed retrieval and line parsers (no storage)
//! - **[`database`]**: SQLite schema, repositories, in-memory repositories
//! - **[`refresh`]**: refresh cycles, single-flight guards, daily scheduler
//! - **[`lens`]**: query classification and output formatting
//! - **[`config`]**: configuration file and environment handling
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use refdex::database::RefdexDatabase;
//! use refdex::datasets::HttpFeedFetcher;
//! use refdex::lens::bgp::RouteLens;
//! use refdex::refresh::{RouteFeeds, RouteRefresher};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let db = RefdexDatabase::open_in_dir("~/.refdex")?;
//! let routes = Arc::new(db.routes());
//!
//! let refresher = RouteRefresher::new(
//!     routes.clone(),
//!     Arc::new(HttpFeedFetcher::default()),
//!     RouteFeeds::default(),
//! );
//! let summary = refresher.refresh_all(&CancellationToken::new())?;
//! println!("{}", summary);
//!
//! let lens = RouteLens::new(routes);
//! for route in lens.lookup("1.1.1.1")? {
//!     println!("{} AS{} {}", route.prefix, route.asn, route.owner);
//! }
//! ```

pub mod config;
pub mod database;
pub mod datasets;
pub mod error;
pub mod lens;
pub mod refresh;

// =============================================================================
// Configuration
// =============================================================================

pub use config::RefdexConfig;

pub use config::{
    format_size, get_data_source_info, get_sqlite_info, DataSource, DataSourceInfo,
    DataSourceStatus, SqliteDatabaseInfo,
};

// =============================================================================
// Errors
// =============================================================================

pub use error::{FetchError, LookupError, ParseError, RefreshError, RepositoryError};

// =============================================================================
// Database
// =============================================================================

pub use database::RefdexDatabase;

pub use database::{DatabaseConn, SchemaDefinitions, SchemaManager, SchemaStatus, SCHEMA_VERSION};

pub use database::{
    Generation, MemoryRouteRepository, MemoryVendorRepository, RouteBounds, RouteRecord,
    RouteRepository, SqliteRouteRepository, SqliteVendorRepository, VendorRecord,
    VendorRepository,
};

pub use database::{MemoryRefreshLease, RefreshLease, SqliteRefreshLease, DEFAULT_LEASE_TTL};

// =============================================================================
// Datasets, refresh and lenses
// =============================================================================

pub use datasets::{FeedFetcher, HttpFeedFetcher, IpFamily};

pub use refresh::{
    DailySchedule, RefreshScheduler, RouteFeeds, RouteRefreshSummary, RouteRefresher,
    SchedulerHandle, VendorRefreshSummary, VendorRefresher,
};

pub use lens::bgp::{RouteLens, RouteQuery, RouteView};
pub use lens::mac::{VendorLens, VendorView};
pub use lens::utils::OutputFormat;
