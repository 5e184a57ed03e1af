use crate::database::DEFAULT_LEASE_TTL;
use crate::refresh::{
    DailySchedule, RouteFeeds, DEFAULT_ASN_DETAILS_URL, DEFAULT_INSERT_BATCH_SIZE,
    DEFAULT_IPV4_ROUTES_URL, DEFAULT_IPV6_ROUTES_URL, DEFAULT_OUI_URL,
};
use anyhow::{anyhow, Result};
use config::Config;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub struct RefdexConfig {
    /// Path to the directory holding the refdex database
    pub data_dir: String,

    /// Enable debug logging
    pub debug: bool,

    /// Run every refresh once at startup instead of waiting for the schedule
    pub initialise: bool,

    pub ipv4_routes_url: String,
    pub ipv6_routes_url: String,
    pub asn_details_url: String,
    pub oui_url: String,

    /// Per-fetch timeout in seconds (default: 30)
    pub fetch_timeout_secs: u64,

    /// Daily route refresh time, UTC
    pub route_refresh_at: DailySchedule,

    /// Daily vendor refresh time, UTC
    pub vendor_refresh_at: DailySchedule,

    /// Records per repository write (default: 5000)
    pub insert_batch_size: usize,

    /// How long shutdown waits for running refreshes, in seconds (default: 30)
    pub shutdown_grace_secs: u64,

    /// Lifetime of a refresh lease in seconds; bounds how long a crashed
    /// refresher blocks the next one (default: 21600)
    pub refresh_lease_secs: u64,
}

const EMPTY_CONFIG: &str = r#"### refdex configuration file

### directory for the refdex database
# data_dir = "~/.refdex"

### logging and startup
# debug = false
# initialise = false                # refresh every dataset once at startup

### feed locations (http(s) URLs or local paths, .gz/.bz2 supported)
# ipv4_routes_url = "https://thyme.apnic.net/current/data-raw-table"
# ipv6_routes_url = "https://thyme.apnic.net/.combined/ipv6-raw-table"
# asn_details_url = "https://thyme.apnic.net/current/data-used-autnums"
# oui_url = "https://standards-oui.ieee.org/oui/oui.txt"

### refresh settings
# fetch_timeout_secs = 30
# route_refresh_at = "02:00"        # daily, UTC
# vendor_refresh_at = "02:00"       # daily, UTC
# insert_batch_size = 5000
# shutdown_grace_secs = 30
# refresh_lease_secs = 21600        # lease lifetime shared by all processes
"#;

fn home_dir() -> String {
    dirs::home_dir()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|| ".".to_string())
}

impl Default for RefdexConfig {
    fn default() -> Self {
        Self {
            data_dir: format!("{}/.refdex", home_dir()),
            debug: false,
            initialise: false,
            ipv4_routes_url: DEFAULT_IPV4_ROUTES_URL.to_string(),
            ipv6_routes_url: DEFAULT_IPV6_ROUTES_URL.to_string(),
            asn_details_url: DEFAULT_ASN_DETAILS_URL.to_string(),
            oui_url: DEFAULT_OUI_URL.to_string(),
            fetch_timeout_secs: 30,
            route_refresh_at: DailySchedule::default(),
            vendor_refresh_at: DailySchedule::default(),
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            shutdown_grace_secs: 30,
            refresh_lease_secs: DEFAULT_LEASE_TTL.as_secs(),
        }
    }
}

impl RefdexConfig {
    /// Function to create and initialize a new configuration
    pub fn new(path: &Option<String>) -> Result<RefdexConfig> {
        let mut builder = Config::builder();

        // By default use $HOME/.refdex/refdex.toml as the configuration file path
        let refdex_dir = format!("{}/.refdex", home_dir());

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                std::fs::create_dir_all(refdex_dir.as_str())
                    .map_err(|e| anyhow!("Unable to create refdex directory: {}", e))?;
                let p = format!("{}/refdex.toml", refdex_dir.as_str());
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // Add in settings from the environment (with a prefix of REFDEX)
        // E.g., `REFDEX_DATA_DIR=/var/lib/refdex refdex serve`
        builder = builder.add_source(config::Environment::with_prefix("REFDEX"));

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        Self::from_map(&config)
    }

    /// Build a configuration from flat key/value settings, defaults filling gaps
    pub fn from_map(config: &HashMap<String, String>) -> Result<RefdexConfig> {
        let defaults = RefdexConfig::default();

        let data_dir = match config.get("data_dir") {
            Some(p) => expand_home(p),
            None => defaults.data_dir,
        };

        let text = |key: &str, default: String| config.get(key).cloned().unwrap_or(default);

        Ok(RefdexConfig {
            data_dir,
            debug: parse_or(config, "debug", defaults.debug)?,
            initialise: parse_or(config, "initialise", defaults.initialise)?,
            ipv4_routes_url: text("ipv4_routes_url", defaults.ipv4_routes_url),
            ipv6_routes_url: text("ipv6_routes_url", defaults.ipv6_routes_url),
            asn_details_url: text("asn_details_url", defaults.asn_details_url),
            oui_url: text("oui_url", defaults.oui_url),
            fetch_timeout_secs: parse_or(config, "fetch_timeout_secs", defaults.fetch_timeout_secs)?,
            route_refresh_at: parse_or(config, "route_refresh_at", defaults.route_refresh_at)?,
            vendor_refresh_at: parse_or(config, "vendor_refresh_at", defaults.vendor_refresh_at)?,
            insert_batch_size: parse_or(config, "insert_batch_size", defaults.insert_batch_size)?,
            shutdown_grace_secs: parse_or(
                config,
                "shutdown_grace_secs",
                defaults.shutdown_grace_secs,
            )?,
            refresh_lease_secs: parse_or(config, "refresh_lease_secs", defaults.refresh_lease_secs)?,
        })
    }

    /// Get the path to the SQLite database file
    pub fn sqlite_path(&self) -> String {
        let data_dir = self.data_dir.trim_end_matches('/');
        format!("{}/{}", data_dir, crate::database::DATABASE_FILE)
    }

    pub fn route_feeds(&self) -> RouteFeeds {
        RouteFeeds {
            ipv4: self.ipv4_routes_url.clone(),
            ipv6: self.ipv6_routes_url.clone(),
            asn_details: self.asn_details_url.clone(),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn refresh_lease_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_lease_secs)
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        [
            format!("Data Directory:     {}", self.data_dir),
            format!("SQLite Path:        {}", self.sqlite_path()),
            format!("IPv4 Routes:        {}", self.ipv4_routes_url),
            format!("IPv6 Routes:        {}", self.ipv6_routes_url),
            format!("ASN Details:        {}", self.asn_details_url),
            format!("MAC Vendors:        {}", self.oui_url),
            format!("Fetch Timeout:      {} seconds", self.fetch_timeout_secs),
            format!("Route Refresh:      daily at {}", self.route_refresh_at),
            format!("Vendor Refresh:     daily at {}", self.vendor_refresh_at),
            format!("Insert Batch Size:  {}", self.insert_batch_size),
            format!("Shutdown Grace:     {} seconds", self.shutdown_grace_secs),
            format!("Refresh Lease:      {} seconds", self.refresh_lease_secs),
            format!("Initial Refresh:    {}", self.initialise),
        ]
        .join("\n")
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        format!("{}/.refdex/refdex.toml", home_dir())
    }
}

fn expand_home(path: &str) -> String {
    match path.strip_prefix("~") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("{}{}", home_dir(), rest),
        _ => path.to_string(),
    }
}

fn parse_or<T>(config: &HashMap<String, String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match config.get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid value '{}' for {}: {}", value, key, e)),
        None => Ok(default),
    }
}

// =============================================================================
// Data source status (used by the status and config commands)
// =============================================================================

/// Datasets refdex maintains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Routes,
    Vendors,
}

impl DataSource {
    pub fn all() -> Vec<DataSource> {
        vec![DataSource::Routes, DataSource::Vendors]
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataSource::Routes => "routes",
            DataSource::Vendors => "vendors",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DataSource::Routes => "BGP routes with ASN owner and country (from APNIC)",
            DataSource::Vendors => "MAC address vendor prefixes (from the IEEE registry)",
        }
    }
}

impl FromStr for DataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "routes" | "bgp" => Ok(DataSource::Routes),
            "vendors" | "mac" | "oui" => Ok(DataSource::Vendors),
            _ => Err(format!(
                "Unknown data source '{}'. Valid: routes, vendors",
                s
            )),
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Information about an individual data source
#[derive(Debug, Serialize, Clone)]
pub struct DataSourceInfo {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
    pub status: DataSourceStatus,
}

/// Status of a data source
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceStatus {
    /// Data is loaded and available
    Ready,
    /// Data source is empty, needs refresh
    Empty,
    /// Database does not exist or has no schema yet
    NotInitialized,
}

impl DataSourceStatus {
    fn from_count(count: Option<u64>) -> Self {
        match count {
            Some(count) if count > 0 => DataSourceStatus::Ready,
            Some(_) => DataSourceStatus::Empty,
            None => DataSourceStatus::NotInitialized,
        }
    }
}

impl std::fmt::Display for DataSourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSourceStatus::Ready => write!(f, "ready"),
            DataSourceStatus::Empty => write!(f, "empty"),
            DataSourceStatus::NotInitialized => write!(f, "not initialized"),
        }
    }
}

/// Information about the SQLite database
#[derive(Debug, Serialize, Clone, Default)]
pub struct SqliteDatabaseInfo {
    pub path: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub schema_initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_routes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6_routes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_count: Option<u64>,
}

/// Get SQLite database information without creating the database
pub fn get_sqlite_info(config: &RefdexConfig) -> SqliteDatabaseInfo {
    use crate::database::{
        DatabaseConn, RouteRepository, SchemaManager, SchemaStatus, SqliteRouteRepository,
        SqliteVendorRepository, VendorRepository,
    };
    use crate::datasets::IpFamily;

    let sqlite_path = config.sqlite_path();
    let mut info = SqliteDatabaseInfo {
        path: sqlite_path.clone(),
        ..Default::default()
    };

    if !Path::new(&sqlite_path).exists() {
        return info;
    }
    info.exists = true;
    info.size_bytes = std::fs::metadata(&sqlite_path).ok().map(|m| m.len());

    let current = DatabaseConn::open_path(&sqlite_path)
        .ok()
        .and_then(|db| SchemaManager::new(&db.conn).check_status().ok())
        .is_some_and(|status| status == SchemaStatus::Current);
    if !current {
        return info;
    }
    info.schema_initialized = true;

    let routes = SqliteRouteRepository::new(&sqlite_path);
    if let Ok(generation) = routes.current_generation() {
        info.route_generation = Some(generation);
        info.ipv4_routes = routes
            .count_generation(generation, Some(IpFamily::V4))
            .ok();
        info.ipv6_routes = routes
            .count_generation(generation, Some(IpFamily::V6))
            .ok();
    }
    info.vendor_count = SqliteVendorRepository::new(&sqlite_path).count().ok();

    info
}

/// Get detailed information about all data sources
pub fn get_data_source_info(config: &RefdexConfig) -> Vec<DataSourceInfo> {
    let sqlite_info = get_sqlite_info(config);

    let route_count = match (sqlite_info.ipv4_routes, sqlite_info.ipv6_routes) {
        (Some(v4), Some(v6)) => Some(v4 + v6),
        (Some(v4), None) => Some(v4),
        (None, Some(v6)) => Some(v6),
        (None, None) => None,
    };

    vec![
        DataSourceInfo {
            name: DataSource::Routes.name().to_string(),
            description: DataSource::Routes.description().to_string(),
            record_count: route_count,
            generation: sqlite_info.route_generation,
            status: DataSourceStatus::from_count(route_count),
        },
        DataSourceInfo {
            name: DataSource::Vendors.name().to_string(),
            description: DataSource::Vendors.description().to_string(),
            record_count: sqlite_info.vendor_count,
            generation: None,
            status: DataSourceStatus::from_count(sqlite_info.vendor_count),
        },
    ]
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
