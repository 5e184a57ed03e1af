use refdex::refresh::RouteFeeds;

pub const IPV4_FEED: &str = "ipv4";
pub const IPV6_FEED: &str = "ipv6";
pub const ASN_FEED: &str = "autnums";
pub const OUI_FEED: &str = "oui";

/// Nine well-formed detail lines and one that is not
pub const ASN_DETAILS: &str = "\
    13335 CLOUDFLARENET - Cloudflare, Inc., US
    15169 GOOGLE - Google LLC, US
     3356 LEVEL3 - Level 3 Parent, LLC, US
     2914 NTT-COMMUNICATIONS-2914 - NTT America, Inc., US
      714 APPLE-ENGINEERING - Apple Inc., US
     4608 APNIC-SERVICES Asia Pacific Network Information Centre, AU
     7018 ATT-INTERNET4 - AT&T Services, Inc., US
      174 COGENT-174 - Cogent Communications, US
     6939 HURRICANE - Hurricane Electric LLC, US
this line is not an asn detail
";

/// Seven routes plus a header line; AS64500 has no detail entry
pub const IPV4_ROUTES: &str = "\
# prefix	origin
1.0.0.0/24	13335
1.1.1.0/24	13335
8.0.0.0/9	3356
8.0.0.0/12	3356
8.8.8.0/24	15169
17.0.0.0/8	714
203.0.113.0/24	64500
";

pub const IPV6_ROUTES: &str = "\
2606:4700::/32	13335
2001:4860::/32	15169
2001:4860:4860::/48	15169
";

/// Three entries and one malformed entry line
pub const OUI_REGISTRY: &str = "\
OUI/MA-L			Organization
company_id			Organization
				Address

00-00-0C   (hex)		Cisco Systems, Inc
00000C     (base 16)		Cisco Systems, Inc
				170 West Tasman Drive
				San Jose  CA  95134
				US

AC-DE-48   (hex)		Private
ACDE48     (base 16)		Private

00-50-56   (hex)		VMware, Inc.
005056     (base 16)		VMware, Inc.
				3401 Hillview Avenue
				Palo Alto  CA  94304
				US

BROKEN (base 16) line
";

pub fn feeds() -> RouteFeeds {
    RouteFeeds {
        ipv4: IPV4_FEED.to_string(),
        ipv6: IPV6_FEED.to_string(),
        asn_details: ASN_FEED.to_string(),
    }
}

/// Fetcher serving every fixture feed
pub fn fixture_fetcher() -> super::MockFeedFetcher {
    super::MockFeedFetcher::new()
        .with_feed(IPV4_FEED, IPV4_ROUTES)
        .with_feed(IPV6_FEED, IPV6_ROUTES)
        .with_feed(ASN_FEED, ASN_DETAILS)
        .with_feed(OUI_FEED, OUI_REGISTRY)
}
