#![allow(dead_code)]

pub mod fixtures;
pub mod mock_fetcher;
pub mod mock_repositories;

pub use fixtures::*;
pub use mock_fetcher::MockFeedFetcher;
pub use mock_repositories::{FailingRouteRepository, FailingVendorRepository};
