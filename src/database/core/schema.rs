//! Database schema management
//!
//! This module provides schema definitions and management for the refdex
//! database. Route records, the generation pointer, vendor records and the
//! refresh leases all live in one SQLite file.

use anyhow::{anyhow, Result};
use rusqlite::Connection;

/// Current schema version
/// Increment this when making breaking schema changes
pub const SCHEMA_VERSION: u32 = 2;

/// Schema definitions for all tables in the refdex database
pub struct SchemaDefinitions;

impl SchemaDefinitions {
    /// SQL for creating the meta table (tracks schema version and global metadata)
    pub const META_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS refdex_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );
    "#;

    /// SQL for creating the route record table
    ///
    /// Exactly one bounds pair is set, matching `ip_family`. IPv6 bounds are
    /// fixed-width lowercase hex so text comparison equals numeric comparison.
    pub const BGP_ROUTE_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS bgp_route (
            id TEXT PRIMARY KEY,
            generation INTEGER NOT NULL,
            ip_family INTEGER NOT NULL,
            prefix TEXT NOT NULL,
            asn INTEGER NOT NULL,
            owner TEXT NOT NULL,
            country_code TEXT NOT NULL,
            ipv4_start INTEGER,
            ipv4_end INTEGER,
            ipv6_start TEXT,
            ipv6_end TEXT,
            CHECK (
                (ip_family = 4 AND ipv4_start IS NOT NULL AND ipv4_end IS NOT NULL
                    AND ipv6_start IS NULL AND ipv6_end IS NULL AND ipv4_start <= ipv4_end)
                OR
                (ip_family = 6 AND ipv6_start IS NOT NULL AND ipv6_end IS NOT NULL
                    AND ipv4_start IS NULL AND ipv4_end IS NULL AND ipv6_start <= ipv6_end)
            )
        );
    "#;

    /// SQL for creating the single-row generation pointer
    pub const BGP_ROUTE_GENERATION_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS bgp_route_generation (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            generation INTEGER NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );
    "#;

    /// SQL for creating route indexes
    pub const BGP_ROUTE_INDEXES: &'static [&'static str] = &[
        "CREATE INDEX IF NOT EXISTS idx_bgp_route_asn ON bgp_route(generation, asn)",
        "CREATE INDEX IF NOT EXISTS idx_bgp_route_ipv4 ON bgp_route(generation, ip_family, ipv4_start, ipv4_end)",
        "CREATE INDEX IF NOT EXISTS idx_bgp_route_ipv6 ON bgp_route(generation, ip_family, ipv6_start, ipv6_end)",
    ];

    /// SQL for creating the MAC vendor table
    pub const MAC_OUI_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS mac_oui (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            prefix TEXT NOT NULL UNIQUE,
            company_name TEXT NOT NULL
        );
    "#;

    pub const MAC_OUI_INDEXES: &'static [&'static str] =
        &["CREATE INDEX IF NOT EXISTS idx_mac_oui_company ON mac_oui(company_name)"];

    /// SQL for creating the refresh lease table, one row per dataset
    pub const REFRESH_LEASE_TABLE: &'static str = r#"
        CREATE TABLE IF NOT EXISTS refresh_lease (
            dataset TEXT PRIMARY KEY,
            holder TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        );
    "#;
}

/// Schema manager for the refdex database
///
/// Handles schema initialization, version checking, and reset.
pub struct SchemaManager<'a> {
    conn: &'a Connection,
}

impl<'a> SchemaManager<'a> {
    /// Create a new schema manager for the given connection
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Initialize the database schema
    ///
    /// Creates all tables and indexes if they don't exist.
    /// Sets the schema version in the meta table.
    pub fn initialize(&self) -> Result<()> {
        self.conn
            .execute(SchemaDefinitions::META_TABLE, [])
            .map_err(|e| anyhow!("Failed to create meta table: {}", e))?;

        self.set_meta("schema_version", &SCHEMA_VERSION.to_string())?;

        self.conn
            .execute(SchemaDefinitions::BGP_ROUTE_TABLE, [])
            .map_err(|e| anyhow!("Failed to create bgp_route table: {}", e))?;

        self.conn
            .execute(SchemaDefinitions::BGP_ROUTE_GENERATION_TABLE, [])
            .map_err(|e| anyhow!("Failed to create bgp_route_generation table: {}", e))?;

        for index_sql in SchemaDefinitions::BGP_ROUTE_INDEXES {
            self.conn
                .execute(index_sql, [])
                .map_err(|e| anyhow!("Failed to create route index: {}", e))?;
        }

        self.conn
            .execute(SchemaDefinitions::MAC_OUI_TABLE, [])
            .map_err(|e| anyhow!("Failed to create mac_oui table: {}", e))?;

        for index_sql in SchemaDefinitions::MAC_OUI_INDEXES {
            self.conn
                .execute(index_sql, [])
                .map_err(|e| anyhow!("Failed to create vendor index: {}", e))?;
        }

        self.conn
            .execute(SchemaDefinitions::REFRESH_LEASE_TABLE, [])
            .map_err(|e| anyhow!("Failed to create refresh_lease table: {}", e))?;

        Ok(())
    }

    /// Check the current schema status
    pub fn check_status(&self) -> Result<SchemaStatus> {
        let meta_exists: i32 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='refdex_meta'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if meta_exists == 0 {
            return Ok(SchemaStatus::NotInitialized);
        }

        let current_version = self.get_schema_version()?;

        if current_version == SCHEMA_VERSION {
            if self.verify_integrity()? {
                Ok(SchemaStatus::Current)
            } else {
                Ok(SchemaStatus::Corrupted)
            }
        } else if current_version < SCHEMA_VERSION {
            Ok(SchemaStatus::NeedsMigration {
                from: current_version,
                to: SCHEMA_VERSION,
            })
        } else {
            Ok(SchemaStatus::Incompatible {
                database_version: current_version,
                required_version: SCHEMA_VERSION,
            })
        }
    }

    /// Get the current schema version from the database
    fn get_schema_version(&self) -> Result<u32> {
        match self.get_meta("schema_version")? {
            Some(version) => version
                .parse()
                .map_err(|e| anyhow!("Invalid schema version: {}", e)),
            None => Ok(0),
        }
    }

    /// Verify schema integrity by checking required tables exist
    fn verify_integrity(&self) -> Result<bool> {
        let required_tables = [
            "refdex_meta",
            "bgp_route",
            "bgp_route_generation",
            "mac_oui",
            "refresh_lease",
        ];

        for table in required_tables {
            let exists: i32 = self
                .conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap_or(0);

            if exists == 0 {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Set a metadata value
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO refdex_meta (key, value, updated_at) VALUES (?1, ?2, strftime('%s', 'now'))",
                [key, value],
            )
            .map_err(|e| anyhow!("Failed to set meta value: {}", e))?;
        Ok(())
    }

    /// Get a metadata value
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let result: Result<String, _> = self.conn.query_row(
            "SELECT value FROM refdex_meta WHERE key = ?1",
            [key],
            |row| row.get(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(anyhow!("Failed to get meta value: {}", e)),
        }
    }

    /// Reset the database by dropping all tables
    pub fn reset(&self) -> Result<()> {
        self.conn.execute("DROP TABLE IF EXISTS bgp_route", [])?;
        self.conn
            .execute("DROP TABLE IF EXISTS bgp_route_generation", [])?;
        self.conn.execute("DROP TABLE IF EXISTS mac_oui", [])?;
        self.conn.execute("DROP TABLE IF EXISTS refresh_lease", [])?;
        self.conn.execute("DROP TABLE IF EXISTS refdex_meta", [])?;

        Ok(())
    }
}

/// Status of the database schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStatus {
    /// Database is not initialized (fresh database)
    NotInitialized,

    /// Schema is current and valid
    Current,

    /// Schema needs migration from an older version
    NeedsMigration { from: u32, to: u32 },

    /// Database is from a newer version (incompatible)
    Incompatible {
        database_version: u32,
        required_version: u32,
    },

    /// Schema is corrupted (missing tables)
    Corrupted,
}
