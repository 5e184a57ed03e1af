//! BGP route lookup lens
//!
//! This module provides the `RouteLens` for route lookups against the current
//! generation. A single free-form token is classified, first match wins:
//!
//! 1. optional `AS` prefix (any case) followed by an unsigned integer: ASN
//! 2. IPv4 address (IPv4-mapped IPv6 addresses included)
//! 3. IPv6 address
//! 4. anything else: owner substring
//!
//! Every covering prefix is returned, not only the most specific one.
//!
//! # Example
//!
//! ```rust,ignore
//! use refdex::lens::bgp::RouteLens;
//! use refdex::lens::utils::OutputFormat;
//!
//! let lens = RouteLens::new(Arc::new(db.routes()));
//! let routes = lens.lookup("AS13335")?;
//! println!("{}", RouteLens::format_results(&routes, OutputFormat::Table));
//! ```

use crate::database::{Generation, RouteRecord, RouteRepository};
use crate::datasets::IpFamily;
use crate::error::LookupError;
use crate::lens::utils::{format_rows, OutputFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tabled::Tabled;

// =============================================================================
// Types
// =============================================================================

/// A classified route query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteQuery {
    Asn(u32),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Owner(String),
}

impl RouteQuery {
    pub fn classify(token: &str) -> Result<Self, LookupError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(LookupError::EmptyQuery);
        }

        let digits = match token.get(..2) {
            Some(prefix) if prefix.eq_ignore_ascii_case("as") => &token[2..],
            _ => token,
        };
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(asn) = digits.parse::<u32>() {
                return Ok(RouteQuery::Asn(asn));
            }
        }

        if let Ok(v4) = token.parse::<Ipv4Addr>() {
            return Ok(RouteQuery::Ipv4(v4));
        }

        if let Ok(v6) = token.parse::<Ipv6Addr>() {
            return Ok(match v6.to_ipv4_mapped() {
                Some(v4) => RouteQuery::Ipv4(v4),
                None => RouteQuery::Ipv6(v6),
            });
        }

        Ok(RouteQuery::Owner(token.to_string()))
    }
}

impl fmt::Display for RouteQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteQuery::Asn(asn) => write!(f, "AS{}", asn),
            RouteQuery::Ipv4(ip) => write!(f, "{}", ip),
            RouteQuery::Ipv6(ip) => write!(f, "{}", ip),
            RouteQuery::Owner(owner) => write!(f, "owner '{}'", owner),
        }
    }
}

/// Route as presented to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Tabled)]
pub struct RouteView {
    pub route: String,
    pub asn_number: u32,
    pub owner: String,
    pub country_code: String,
}

impl From<&RouteRecord> for RouteView {
    fn from(record: &RouteRecord) -> Self {
        Self {
            route: record.prefix.clone(),
            asn_number: record.asn,
            owner: record.owner.clone(),
            country_code: record.country_code.clone(),
        }
    }
}

/// Current route dataset state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStatus {
    pub generation: Generation,
    pub ipv4_routes: u64,
    pub ipv6_routes: u64,
}

// =============================================================================
// Lens
// =============================================================================

pub struct RouteLens {
    repository: Arc<dyn RouteRepository>,
}

impl RouteLens {
    pub fn new(repository: Arc<dyn RouteRepository>) -> Self {
        Self { repository }
    }

    /// Classify a token and run the matching query
    ///
    /// No matches is an empty vector, not an error.
    pub fn lookup(&self, token: &str) -> Result<Vec<RouteRecord>, LookupError> {
        let query = RouteQuery::classify(token)?;
        self.query(&query)
    }

    pub fn query(&self, query: &RouteQuery) -> Result<Vec<RouteRecord>, LookupError> {
        let records = match query {
            RouteQuery::Asn(asn) => self.repository.by_asn(*asn)?,
            RouteQuery::Ipv4(ip) => self.repository.by_ipv4(*ip)?,
            RouteQuery::Ipv6(ip) => self.repository.by_ipv6(*ip)?,
            RouteQuery::Owner(owner) => self.repository.by_owner(owner)?,
        };
        Ok(records)
    }

    pub fn status(&self) -> Result<RouteStatus, LookupError> {
        let generation = self.repository.current_generation()?;
        Ok(RouteStatus {
            generation,
            ipv4_routes: self
                .repository
                .count_generation(generation, Some(IpFamily::V4))?,
            ipv6_routes: self
                .repository
                .count_generation(generation, Some(IpFamily::V6))?,
        })
    }

    pub fn format_results(records: &[RouteRecord], format: OutputFormat) -> String {
        let views: Vec<RouteView> = records.iter().map(RouteView::from).collect();
        format_rows(&views, format)
    }
}

// =============================================================================
// Tests
// =============================================================================
