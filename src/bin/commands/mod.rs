pub mod bgp;
pub mod config;
pub mod mac;
pub mod refresh;
pub mod serve;
pub mod status;

use anyhow::{anyhow, Result};
use refdex::database::RefdexDatabase;
use refdex::datasets::HttpFeedFetcher;
use refdex::refresh::{RouteRefresher, VendorRefresher};
use refdex::RefdexConfig;
use std::sync::Arc;

/// Open (or create) the database under the configured data directory
pub(crate) fn open_database(config: &RefdexConfig) -> Result<RefdexDatabase> {
    RefdexDatabase::open_in_dir(&config.data_dir)
        .map_err(|e| anyhow!("Failed to open database in {}: {}", config.data_dir, e))
}

/// Build both refreshers against the configured feeds
pub(crate) fn build_refreshers(
    config: &RefdexConfig,
    db: &RefdexDatabase,
) -> (RouteRefresher, VendorRefresher) {
    let fetcher = Arc::new(HttpFeedFetcher::new(config.fetch_timeout()));

    let routes = RouteRefresher::new(
        Arc::new(db.routes()),
        fetcher.clone(),
        config.route_feeds(),
    )
    .with_batch_size(config.insert_batch_size)
    .with_lease_ttl(config.refresh_lease_ttl());

    let vendors = VendorRefresher::new(Arc::new(db.vendors()), fetcher, config.oui_url.clone())
        .with_batch_size(config.insert_batch_size)
        .with_lease_ttl(config.refresh_lease_ttl());

    (routes, vendors)
}
