//! BGP route table and ASN detail feeds
//!
//! Two independent line grammars:
//!
//! - ASN details, `<ws>ASN<ws>Owner name, CC`. Lines that do not have this
//!   shape are skipped silently.
//! - Route tables, `prefix/length<ws>ASN`. Lines that do not look like a route
//!   (headers, blank lines, foreign families) are skipped. A line that looks like
//!   a route but whose prefix or ASN cannot be parsed aborts the cycle with a
//!   `ParseError`, since a corrupt range would make lookups silently wrong.

use crate::datasets::fetcher::next_line;
use crate::datasets::IpFamily;
use crate::error::{FetchError, ParseError, RefreshError};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::collections::HashMap;
use std::io::BufRead;
use std::str::FromStr;
use tracing::{debug, info};

/// Owner and country placeholder for ASNs missing from the detail feed
pub const UNKNOWN: &str = "Unknown";

/// Owner and registration country of an ASN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsnDetail {
    pub owner: String,
    pub country_code: String,
}

impl AsnDetail {
    pub fn unknown() -> Self {
        Self {
            owner: UNKNOWN.to_string(),
            country_code: UNKNOWN.to_string(),
        }
    }
}

/// ASN to detail mapping, built fresh for every route refresh
pub type AsnDetailMap = HashMap<u32, AsnDetail>;

/// Parse one ASN detail line, `None` if it does not have the expected shape
pub fn parse_asn_detail_line(line: &str) -> Option<(u32, AsnDetail)> {
    let rest = line.trim_start();
    let digits = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if digits == 0 {
        return None;
    }

    let (asn_text, rest) = rest.split_at(digits);
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let asn: u32 = asn_text.parse().ok()?;

    let (owner, tail) = split_owner_country(rest.trim_start())?;
    let country_code: String = tail
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();

    Some((
        asn,
        AsnDetail {
            owner: owner.to_string(),
            country_code,
        },
    ))
}

/// Split at the last comma that is followed by whitespace and a word character
fn split_owner_country(text: &str) -> Option<(&str, &str)> {
    let mut end = text.len();
    while let Some(idx) = text[..end].rfind(',') {
        let mut after = text[idx + 1..].chars();
        if after.next().is_some_and(char::is_whitespace) {
            let tail = after.as_str();
            if tail
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric() || c == '_')
            {
                return Some((&text[..idx], tail));
            }
        }
        end = idx;
    }
    None
}

/// Read a whole ASN detail feed into a map
///
/// Mismatching lines are skipped; only a failure reading the stream is an error.
pub fn parse_asn_details(reader: &mut dyn BufRead) -> Result<AsnDetailMap, FetchError> {
    let mut details = AsnDetailMap::new();
    let mut buf = Vec::new();
    let mut line_no = 0usize;
    let mut skipped = 0usize;

    loop {
        line_no += 1;
        let Some(line) = next_line(reader, &mut buf, line_no)? else {
            break;
        };
        match parse_asn_detail_line(&line) {
            Some((asn, detail)) => {
                details.insert(asn, detail);
            }
            None => {
                skipped += 1;
                debug!("Skipping ASN detail line {}: {:?}", line_no, line);
            }
        }
    }

    info!(
        "Parsed {} ASN details ({} lines skipped)",
        details.len(),
        skipped
    );
    Ok(details)
}

/// A route line that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRoute {
    /// Prefix text as it appeared in the feed
    pub prefix: String,
    pub asn: u32,
    pub net: IpNet,
}

/// Parse one route line for the given family
///
/// Returns `Ok(None)` for lines that are not routes of this family.
pub fn parse_route_line(
    line: &str,
    line_no: usize,
    family: IpFamily,
) -> Result<Option<ParsedRoute>, ParseError> {
    let mut tokens = line.split_whitespace();
    let (Some(prefix), Some(asn_text)) = (tokens.next(), tokens.next()) else {
        return Ok(None);
    };
    let Some((addr, len)) = prefix.split_once('/') else {
        return Ok(None);
    };

    let looks_like_route = !addr.is_empty()
        && !len.is_empty()
        && addr.chars().all(|c| family.is_address_char(c))
        && len.bytes().all(|b| b.is_ascii_digit())
        && asn_text.bytes().all(|b| b.is_ascii_digit());
    if !looks_like_route {
        return Ok(None);
    }

    let asn: u32 = asn_text
        .parse()
        .map_err(|_| ParseError::new(line_no, line, format!("ASN '{}' out of range", asn_text)))?;

    let net = match family {
        IpFamily::V4 => Ipv4Net::from_str(prefix).map(IpNet::V4),
        IpFamily::V6 => Ipv6Net::from_str(prefix).map(IpNet::V6),
    }
    .map_err(|e| ParseError::new(line_no, line, format!("invalid prefix '{}': {}", prefix, e)))?;

    Ok(Some(ParsedRoute {
        prefix: prefix.to_string(),
        asn,
        net,
    }))
}

/// Lazy iterator over the routes of a route table feed
///
/// Yields parsed routes until the stream ends. The first read or parse error is
/// yielded once and ends the iteration.
pub struct RouteLines<R: BufRead> {
    reader: R,
    family: IpFamily,
    buf: Vec<u8>,
    line_no: usize,
    skipped: usize,
    done: bool,
}

impl<R: BufRead> RouteLines<R> {
    pub fn new(reader: R, family: IpFamily) -> Self {
        Self {
            reader,
            family,
            buf: Vec::new(),
            line_no: 0,
            skipped: 0,
            done: false,
        }
    }

    /// Number of non-route lines skipped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R: BufRead> Iterator for RouteLines<R> {
    type Item = Result<ParsedRoute, RefreshError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.line_no += 1;
            let line = match next_line(&mut self.reader, &mut self.buf, self.line_no) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            };

            match parse_route_line(&line, self.line_no, self.family) {
                Ok(Some(route)) => return Some(Ok(route)),
                Ok(None) => self.skipped += 1,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Read};

    #[test]
    fn test_parse_asn_detail_line() {
        let (asn, detail) = parse_asn_detail_line("  13335 CLOUDFLARENET, US").unwrap();
        assert_eq!(asn, 13335);
        assert_eq!(detail.owner, "CLOUDFLARENET");
        assert_eq!(detail.country_code, "US");
    }

    #[test]
    fn test_parse_asn_detail_line_comma_in_owner() {
        let (asn, detail) =
            parse_asn_detail_line("     1 LVLT-1 - Level 3 Parent, LLC, US").unwrap();
        assert_eq!(asn, 1);
        assert_eq!(detail.owner, "LVLT-1 - Level 3 Parent, LLC");
        assert_eq!(detail.country_code, "US");
    }

    #[test]
    fn test_parse_asn_detail_line_mismatch() {
        assert!(parse_asn_detail_line("").is_none());
        assert!(parse_asn_detail_line("ASN   Name").is_none());
        assert!(parse_asn_detail_line("13335 CLOUDFLARENET").is_none());
        assert!(parse_asn_detail_line("13335CLOUDFLARENET, US").is_none());
        assert!(parse_asn_detail_line("13335 CLOUDFLARENET,US").is_none());
        assert!(parse_asn_detail_line("99999999999 Overflow Inc, US").is_none());
    }

    #[test]
    fn test_parse_asn_details_skips_malformed() {
        let mut feed = String::new();
        for i in 1..=9 {
            feed.push_str(&format!("{:>6} Operator {}, NL\n", 64500 + i, i));
        }
        feed.push_str("this line is garbage\n");

        let mut reader = feed.as_bytes();
        let details = parse_asn_details(&mut reader).unwrap();
        assert_eq!(details.len(), 9);
        assert_eq!(details[&64501].owner, "Operator 1");
        assert_eq!(details[&64509].country_code, "NL");
    }

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            self.served = true;
            let data = b"13335 CLOUDFLARENET, US\n";
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }
    }

    #[test]
    fn test_parse_asn_details_read_failure() {
        let mut reader = io::BufReader::new(FailingReader { served: false });
        let result = parse_asn_details(&mut reader);
        assert!(matches!(result, Err(FetchError::Read { line: 2, .. })));
    }

    #[test]
    fn test_parse_route_line_v4() {
        let route = parse_route_line("1.1.1.0/24\t13335", 1, IpFamily::V4)
            .unwrap()
            .unwrap();
        assert_eq!(route.prefix, "1.1.1.0/24");
        assert_eq!(route.asn, 13335);
        assert_eq!(route.net.to_string(), "1.1.1.0/24");
    }

    #[test]
    fn test_parse_route_line_v6() {
        let route = parse_route_line("2606:4700::/32   13335", 1, IpFamily::V6)
            .unwrap()
            .unwrap();
        assert_eq!(route.prefix, "2606:4700::/32");
        assert_eq!(route.asn, 13335);
    }

    #[test]
    fn test_parse_route_line_skips_non_routes() {
        assert_eq!(parse_route_line("", 1, IpFamily::V4).unwrap(), None);
        assert_eq!(
            parse_route_line("# prefix origin", 1, IpFamily::V4).unwrap(),
            None
        );
        assert_eq!(
            parse_route_line("1.1.1.0/24", 1, IpFamily::V4).unwrap(),
            None
        );
        assert_eq!(
            parse_route_line("2606:4700::/32 13335", 1, IpFamily::V4).unwrap(),
            None
        );
        assert_eq!(
            parse_route_line("1.1.1.0/24 13335", 1, IpFamily::V6).unwrap(),
            None
        );
        assert_eq!(
            parse_route_line("1.1.1.0/24 AS13335", 1, IpFamily::V4).unwrap(),
            None
        );
    }

    #[test]
    fn test_parse_route_line_malformed_prefix_is_fatal() {
        let err = parse_route_line("1.1.1.0/40 13335", 7, IpFamily::V4).unwrap_err();
        assert_eq!(err.line, 7);
        assert!(err.reason.contains("invalid prefix"));

        let err = parse_route_line("1.1.1/24 13335", 8, IpFamily::V4).unwrap_err();
        assert_eq!(err.line, 8);

        let err = parse_route_line("2606:::4700/32 13335", 9, IpFamily::V6).unwrap_err();
        assert_eq!(err.line, 9);
    }

    #[test]
    fn test_parse_route_line_asn_overflow_is_fatal() {
        let err = parse_route_line("1.1.1.0/24 99999999999", 3, IpFamily::V4).unwrap_err();
        assert!(err.reason.contains("out of range"));
    }

    #[test]
    fn test_route_lines_iterates_and_skips() {
        let feed = "header line\n1.1.1.0/24\t13335\n\n8.8.8.0/24\t15169\n";
        let mut lines = RouteLines::new(feed.as_bytes(), IpFamily::V4);
        let routes: Vec<ParsedRoute> = lines.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[1].asn, 15169);
        assert_eq!(lines.skipped(), 2);
    }

    #[test]
    fn test_route_lines_stops_at_parse_error() {
        let feed = "1.1.1.0/24\t13335\n1.1.1.0/33\t13335\n8.8.8.0/24\t15169\n";
        let results: Vec<_> = RouteLines::new(feed.as_bytes(), IpFamily::V4).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(RefreshError::Parse(_))));
    }
}
