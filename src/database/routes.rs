//! Versioned route repository
//!
//! Route records are tagged with a generation and never updated in place. A
//! single-row pointer (`bgp_route_generation`) designates the generation that
//! queries see. A refresh writes generation `V+1` next to the live `V`, flips
//! the pointer in one statement and then bulk-deletes `V`.
//!
//! # Range Storage
//!
//! - IPv4 bounds are stored as 32-bit integers (network and broadcast).
//! - IPv6 bounds are stored as fixed-width lowercase hex strings, so string
//!   comparison in SQL is numeric comparison.
//!
//! Lookups return every covering prefix. There is no longest-prefix selection.

use crate::datasets::{
    canonical_ipv6, ipv4_bounds, ipv6_bounds, AsnDetail, IpFamily, ParsedRoute,
};
use crate::database::core::DatabaseConn;
use crate::database::lease::{RefreshLease, SqliteRefreshLease};
use crate::error::RepositoryError;
use ipnet::IpNet;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Route dataset generation, 0 means no data yet
pub type Generation = i64;

/// Range bounds of a route, exactly one family per record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum RouteBounds {
    V4 { start: u32, end: u32 },
    V6 { start: String, end: String },
}

impl RouteBounds {
    pub fn from_net(net: &IpNet) -> Self {
        match net {
            IpNet::V4(v4) => {
                let (start, end) = ipv4_bounds(v4);
                RouteBounds::V4 { start, end }
            }
            IpNet::V6(v6) => {
                let (start, end) = ipv6_bounds(v6);
                RouteBounds::V6 { start, end }
            }
        }
    }

    pub fn family(&self) -> IpFamily {
        match self {
            RouteBounds::V4 { .. } => IpFamily::V4,
            RouteBounds::V6 { .. } => IpFamily::V6,
        }
    }

    pub fn contains_ipv4(&self, addr: Ipv4Addr) -> bool {
        let ip = u32::from(addr);
        matches!(self, RouteBounds::V4 { start, end } if *start <= ip && ip <= *end)
    }

    pub fn contains_ipv6(&self, addr: Ipv6Addr) -> bool {
        let ip = canonical_ipv6(addr);
        matches!(
            self,
            RouteBounds::V6 { start, end } if start.as_str() <= ip.as_str() && ip.as_str() <= end.as_str()
        )
    }
}

/// A stored route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub id: Uuid,
    pub generation: Generation,
    pub prefix: String,
    pub asn: u32,
    pub owner: String,
    pub country_code: String,
    pub bounds: RouteBounds,
}

impl RouteRecord {
    /// Build a record for `generation` from a parsed feed line and its ASN detail
    pub fn new(generation: Generation, route: &ParsedRoute, detail: &AsnDetail) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
            prefix: route.prefix.clone(),
            asn: route.asn,
            owner: detail.owner.clone(),
            country_code: detail.country_code.clone(),
            bounds: RouteBounds::from_net(&route.net),
        }
    }

    pub fn family(&self) -> IpFamily {
        self.bounds.family()
    }

    /// Key used to order lookup results the same way in every backend
    pub(crate) fn sort_key(&self) -> (u8, u32, &str, u32, &str) {
        let (v4, v6) = match &self.bounds {
            RouteBounds::V4 { start, .. } => (*start, ""),
            RouteBounds::V6 { start, .. } => (0, start.as_str()),
        };
        (self.family().number(), v4, v6, self.asn, self.prefix.as_str())
    }
}

pub(crate) fn sort_routes(records: &mut [RouteRecord]) {
    records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Storage contract for versioned route records
///
/// Query methods read the pointer and scan only the current generation. An
/// empty result is a success.
pub trait RouteRepository: Send + Sync {
    /// Generation the pointer designates, 0 if it was never set
    fn current_generation(&self) -> Result<Generation, RepositoryError>;

    /// Flip the pointer in a single write
    fn set_current_generation(&self, generation: Generation) -> Result<(), RepositoryError>;

    fn insert(&self, record: &RouteRecord) -> Result<(), RepositoryError> {
        self.insert_batch(std::slice::from_ref(record))
    }

    /// Insert records; either all of the batch is written or none
    fn insert_batch(&self, records: &[RouteRecord]) -> Result<(), RepositoryError>;

    /// Copy every `family` row of generation `from` into generation `to`
    fn copy_family(
        &self,
        from: Generation,
        to: Generation,
        family: IpFamily,
    ) -> Result<u64, RepositoryError>;

    /// Delete all rows of a generation
    fn remove_generation(&self, generation: Generation) -> Result<u64, RepositoryError>;

    /// Delete all rows whose generation differs from `keep`
    fn purge_except(&self, keep: Generation) -> Result<u64, RepositoryError>;

    fn count_generation(
        &self,
        generation: Generation,
        family: Option<IpFamily>,
    ) -> Result<u64, RepositoryError>;

    fn by_asn(&self, asn: u32) -> Result<Vec<RouteRecord>, RepositoryError>;

    fn by_ipv4(&self, addr: Ipv4Addr) -> Result<Vec<RouteRecord>, RepositoryError>;

    fn by_ipv6(&self, addr: Ipv6Addr) -> Result<Vec<RouteRecord>, RepositoryError>;

    /// Case-insensitive substring match on the owner name
    fn by_owner(&self, needle: &str) -> Result<Vec<RouteRecord>, RepositoryError>;

    /// Lease every route refresher against this store must hold
    fn refresh_lease(&self) -> Arc<dyn RefreshLease>;
}

const ROUTE_COLUMNS: &str = "id, generation, ip_family, prefix, asn, owner, country_code, \
                             ipv4_start, ipv4_end, ipv6_start, ipv6_end";

const CURRENT_GENERATION: &str =
    "(SELECT generation FROM bgp_route_generation WHERE id = 1)";

const ORDER_BY: &str = "ORDER BY ip_family, ipv4_start, ipv6_start, asn, prefix";

/// Escape `%`, `_` and the escape char itself for a `LIKE ... ESCAPE '\'` pattern
pub(crate) fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<RouteRecord> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let family: u8 = row.get(2)?;

    let bounds = match IpFamily::from_number(family) {
        Some(IpFamily::V4) => RouteBounds::V4 {
            start: row.get(7)?,
            end: row.get(8)?,
        },
        Some(IpFamily::V6) => RouteBounds::V6 {
            start: row.get(9)?,
            end: row.get(10)?,
        },
        None => {
            return Err(rusqlite::Error::IntegralValueOutOfRange(2, family as i64));
        }
    };

    Ok(RouteRecord {
        id,
        generation: row.get(1)?,
        prefix: row.get(3)?,
        asn: row.get(4)?,
        owner: row.get(5)?,
        country_code: row.get(6)?,
        bounds,
    })
}

/// SQLite-backed route repository
///
/// Opens a fresh connection per operation so the repository can be shared
/// across threads. The schema must already exist (see `RefdexDatabase`).
#[derive(Debug, Clone)]
pub struct SqliteRouteRepository {
    path: PathBuf,
}

impl SqliteRouteRepository {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<DatabaseConn, RepositoryError> {
        DatabaseConn::open_path(&self.path.to_string_lossy())
    }

    fn query(
        conn: &Connection,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<RouteRecord>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM bgp_route WHERE generation = {} AND {} {}",
            ROUTE_COLUMNS, CURRENT_GENERATION, filter, ORDER_BY
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params, row_to_record)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

impl RouteRepository for SqliteRouteRepository {
    fn current_generation(&self) -> Result<Generation, RepositoryError> {
        let db = self.connect()?;
        let result = db.conn.query_row(
            "SELECT generation FROM bgp_route_generation WHERE id = 1",
            [],
            |row| row.get(0),
        );

        match result {
            Ok(generation) => Ok(generation),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn set_current_generation(&self, generation: Generation) -> Result<(), RepositoryError> {
        let db = self.connect()?;
        db.conn.execute(
            "INSERT OR REPLACE INTO bgp_route_generation (id, generation, updated_at)
             VALUES (1, ?1, strftime('%s', 'now'))",
            [generation],
        )?;
        debug!("Route generation pointer set to {}", generation);
        Ok(())
    }

    fn insert_batch(&self, records: &[RouteRecord]) -> Result<(), RepositoryError> {
        if records.is_empty() {
            return Ok(());
        }

        let db = self.connect()?;
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO bgp_route ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                ROUTE_COLUMNS
            ))?;

            for record in records {
                let (v4_start, v4_end, v6_start, v6_end) = match &record.bounds {
                    RouteBounds::V4 { start, end } => (Some(*start), Some(*end), None, None),
                    RouteBounds::V6 { start, end } => {
                        (None, None, Some(start.as_str()), Some(end.as_str()))
                    }
                };
                stmt.execute(params![
                    record.id.to_string(),
                    record.generation,
                    record.family().number(),
                    record.prefix,
                    record.asn,
                    record.owner,
                    record.country_code,
                    v4_start,
                    v4_end,
                    v6_start,
                    v6_end,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn copy_family(
        &self,
        from: Generation,
        to: Generation,
        family: IpFamily,
    ) -> Result<u64, RepositoryError> {
        let db = self.connect()?;
        let mut stmt = db.conn.prepare(&format!(
            "SELECT {} FROM bgp_route WHERE generation = ?1 AND ip_family = ?2",
            ROUTE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![from, family.number()], row_to_record)?;

        let mut copied = Vec::new();
        for row in rows {
            let mut record = row?;
            record.id = Uuid::new_v4();
            record.generation = to;
            copied.push(record);
        }
        drop(stmt);
        drop(db);

        self.insert_batch(&copied)?;
        Ok(copied.len() as u64)
    }

    fn remove_generation(&self, generation: Generation) -> Result<u64, RepositoryError> {
        let db = self.connect()?;
        let removed = db
            .conn
            .execute("DELETE FROM bgp_route WHERE generation = ?1", [generation])?;
        Ok(removed as u64)
    }

    fn purge_except(&self, keep: Generation) -> Result<u64, RepositoryError> {
        let db = self.connect()?;
        let removed = db
            .conn
            .execute("DELETE FROM bgp_route WHERE generation != ?1", [keep])?;
        Ok(removed as u64)
    }

    fn count_generation(
        &self,
        generation: Generation,
        family: Option<IpFamily>,
    ) -> Result<u64, RepositoryError> {
        let db = self.connect()?;
        let count: i64 = match family {
            Some(family) => db.conn.query_row(
                "SELECT COUNT(*) FROM bgp_route WHERE generation = ?1 AND ip_family = ?2",
                params![generation, family.number()],
                |row| row.get(0),
            )?,
            None => db.conn.query_row(
                "SELECT COUNT(*) FROM bgp_route WHERE generation = ?1",
                [generation],
                |row| row.get(0),
            )?,
        };
        Ok(count as u64)
    }

    fn by_asn(&self, asn: u32) -> Result<Vec<RouteRecord>, RepositoryError> {
        let db = self.connect()?;
        Self::query(&db.conn, "asn = ?1", [asn])
    }

    fn by_ipv4(&self, addr: Ipv4Addr) -> Result<Vec<RouteRecord>, RepositoryError> {
        let db = self.connect()?;
        Self::query(
            &db.conn,
            "ip_family = 4 AND ipv4_start <= ?1 AND ipv4_end >= ?1",
            [u32::from(addr)],
        )
    }

    fn by_ipv6(&self, addr: Ipv6Addr) -> Result<Vec<RouteRecord>, RepositoryError> {
        let db = self.connect()?;
        Self::query(
            &db.conn,
            "ip_family = 6 AND ipv6_start <= ?1 AND ipv6_end >= ?1",
            [canonical_ipv6(addr)],
        )
    }

    fn by_owner(&self, needle: &str) -> Result<Vec<RouteRecord>, RepositoryError> {
        let db = self.connect()?;
        let pattern = format!("%{}%", escape_like(needle));
        Self::query(&db.conn, "owner LIKE ?1 ESCAPE '\\'", [pattern])
    }

    fn refresh_lease(&self) -> Arc<dyn RefreshLease> {
        Arc::new(SqliteRefreshLease::new(&self.path, "route"))
    }
}
