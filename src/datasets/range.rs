//! Range and key computation
//!
//! Turns parsed prefixes into the bounds stored next to each route row, and
//! user supplied hardware addresses into vendor prefix keys.
//!
//! IPv4 bounds are plain `u32` values so containment is an integer comparison.
//! IPv6 bounds are fully expanded, zero-padded, lowercase strings
//! (`2606:4700:0000:0000:0000:0000:0000:0000`); with every value rendered at the
//! same fixed width, lexicographic order equals numeric order and containment
//! becomes a string comparison any backend can evaluate.

use ipnet::{Ipv4Net, Ipv6Net};
use std::net::Ipv6Addr;

/// Width of a normalized OUI key in hex digits
pub const OUI_KEY_LEN: usize = 6;

/// Separators accepted inside hardware address tokens
const MAC_SEPARATORS: [char; 3] = [':', '-', '.'];

/// Network and broadcast address of an IPv4 block as integers
pub fn ipv4_bounds(net: &Ipv4Net) -> (u32, u32) {
    (u32::from(net.network()), u32::from(net.broadcast()))
}

/// First and last address of an IPv6 block in canonical form
pub fn ipv6_bounds(net: &Ipv6Net) -> (String, String) {
    (canonical_ipv6(net.network()), canonical_ipv6(net.broadcast()))
}

/// Render an IPv6 address fully expanded, zero-padded and lowercase
pub fn canonical_ipv6(addr: Ipv6Addr) -> String {
    addr.segments()
        .iter()
        .map(|s| format!("{:04x}", s))
        .collect::<Vec<_>>()
        .join(":")
}

/// Normalize a hardware address (or fragment) into an OUI prefix key
///
/// Separators are stripped, letters uppercased to match the registry's form,
/// and the result truncated to six characters. Shorter input is kept as-is and
/// acts as a prefix pattern for the remaining digits.
pub fn normalize_oui(token: &str) -> String {
    token
        .trim()
        .chars()
        .filter(|c| !MAC_SEPARATORS.contains(c))
        .take(OUI_KEY_LEN)
        .collect::<String>()
        .to_uppercase()
}
