//! External reference datasets
//!
//! Everything needed to turn a raw text feed into structured records:
//!
//! - `fetcher`: retrieves a feed as a lazily read line stream
//! - `bgp`: route table and ASN detail grammars
//! - `oui`: IEEE MAC vendor registry grammar
//! - `range`: range bounds for prefixes and keys for vendor prefixes
//!
//! Parsers are explicit tokenizers. Lines that do not have the expected shape
//! are an explicit, counted branch: skipped for the ASN detail and vendor
//! feeds, fatal for route lines whose prefix cannot be parsed.

pub mod bgp;
pub mod fetcher;
pub mod oui;
pub mod range;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use bgp::{
    parse_asn_detail_line, parse_asn_details, parse_route_line, AsnDetail, AsnDetailMap,
    ParsedRoute, RouteLines, UNKNOWN,
};
pub use fetcher::{FeedFetcher, FeedStream, HttpFeedFetcher, DEFAULT_FETCH_TIMEOUT};
pub use oui::{parse_vendor_line, VendorLine, VendorLines, BASE16_MARKER};
pub use range::{canonical_ipv6, ipv4_bounds, ipv6_bounds, normalize_oui, OUI_KEY_LEN};

/// Address family of a route feed or record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    pub fn all() -> [IpFamily; 2] {
        [IpFamily::V4, IpFamily::V6]
    }

    /// Numeric family as persisted (4 or 6)
    pub fn number(&self) -> u8 {
        match self {
            IpFamily::V4 => 4,
            IpFamily::V6 => 6,
        }
    }

    pub fn from_number(n: u8) -> Option<IpFamily> {
        match n {
            4 => Some(IpFamily::V4),
            6 => Some(IpFamily::V6),
            _ => None,
        }
    }

    /// Characters allowed in the address part of a prefix for this family
    pub(crate) fn is_address_char(&self, c: char) -> bool {
        match self {
            IpFamily::V4 => c.is_ascii_digit() || c == '.',
            IpFamily::V6 => c.is_ascii_hexdigit() || c == ':',
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => write!(f, "ipv4"),
            IpFamily::V6 => write!(f, "ipv6"),
        }
    }
}

impl FromStr for IpFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "4" | "v4" | "ipv4" => Ok(IpFamily::V4),
            "6" | "v6" | "ipv6" => Ok(IpFamily::V6),
            _ => Err(format!("Unknown address family '{}'. Valid: ipv4, ipv6", s)),
        }
    }
}
