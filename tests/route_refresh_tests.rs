use refdex::database::{MemoryRouteRepository, RouteRepository};
use refdex::datasets::IpFamily;
use refdex::lens::bgp::RouteLens;
use refdex::refresh::RouteRefresher;
use refdex::{FetchError, RefreshError};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod helpers;
use helpers::*;

fn refresher(repo: Arc<dyn RouteRepository>, fetcher: Arc<MockFeedFetcher>) -> RouteRefresher {
    RouteRefresher::new(repo, fetcher, feeds()).with_batch_size(2)
}

fn prefixes(lens: &RouteLens, token: &str) -> BTreeSet<String> {
    lens.lookup(token)
        .unwrap()
        .into_iter()
        .map(|r| r.prefix)
        .collect()
}

// ============================================================================
// Tests: generation cutover
// ============================================================================

#[test]
fn test_first_refresh_publishes_generation_one() {
    // Arrange
    let repo = Arc::new(MemoryRouteRepository::new());
    let fetcher = Arc::new(fixture_fetcher());
    let refresher = refresher(repo.clone(), fetcher);

    // Act
    let summary = refresher.refresh_all(&CancellationToken::new()).unwrap();

    // Assert
    assert_eq!(summary.previous_generation, 0);
    assert_eq!(summary.generation, 1);
    assert_eq!(summary.ipv4_inserted, 7);
    assert_eq!(summary.ipv6_inserted, 3);
    assert_eq!(summary.skipped_lines, 1); // header line
    assert_eq!(summary.unknown_asns, 1); // AS64500
    assert_eq!(repo.current_generation().unwrap(), 1);
    assert_eq!(repo.count_generation(1, None).unwrap(), 10);
}

#[test]
fn test_second_refresh_retires_previous_generation() {
    let repo = Arc::new(MemoryRouteRepository::new());
    let fetcher = Arc::new(fixture_fetcher());
    let refresher = refresher(repo.clone(), fetcher.clone());
    let cancel = CancellationToken::new();

    refresher.refresh_all(&cancel).unwrap();
    fetcher.set_feed(IPV4_FEED, "1.1.1.0/24\t13335\n");
    let summary = refresher.refresh_all(&cancel).unwrap();

    assert_eq!(summary.previous_generation, 1);
    assert_eq!(summary.generation, 2);
    assert_eq!(summary.retired, 10);
    assert_eq!(repo.current_generation().unwrap(), 2);
    assert_eq!(repo.count_generation(1, None).unwrap(), 0);
    assert_eq!(repo.count_generation(2, Some(IpFamily::V4)).unwrap(), 1);

    // only the new generation is visible
    let lens = RouteLens::new(repo);
    assert!(lens.lookup("8.8.8.8").unwrap().is_empty());
    assert_eq!(lens.lookup("1.1.1.1").unwrap().len(), 1);
}

#[test]
fn test_retire_failure_is_not_fatal() {
    let inner = Arc::new(MemoryRouteRepository::new());
    let repo = Arc::new(FailingRouteRepository::new(inner.clone()));
    let refresher = refresher(repo.clone(), Arc::new(fixture_fetcher()));
    let cancel = CancellationToken::new();

    refresher.refresh_all(&cancel).unwrap();
    repo.fail_remove(true);
    let summary = refresher.refresh_all(&cancel).unwrap();
    assert_eq!(summary.retired, 0);
    assert_eq!(inner.current_generation().unwrap(), 2);
    assert_eq!(inner.count_generation(1, None).unwrap(), 10);

    // leftover generation is purged at the start of the next cycle
    repo.heal();
    let summary = refresher.refresh_all(&cancel).unwrap();
    assert_eq!(summary.purged, 10);
    assert_eq!(inner.count_generation(1, None).unwrap(), 0);
}

// ============================================================================
// Tests: lookups over a refreshed dataset
// ============================================================================

#[test]
fn test_ipv4_lookup_returns_every_covering_prefix() {
    let repo = Arc::new(MemoryRouteRepository::new());
    refresher(repo.clone(), Arc::new(fixture_fetcher()))
        .refresh_all(&CancellationToken::new())
        .unwrap();
    let lens = RouteLens::new(repo);

    let expected: BTreeSet<String> = ["8.0.0.0/9", "8.0.0.0/12", "8.8.8.0/24"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(prefixes(&lens, "8.8.8.8"), expected);

    // network and broadcast addresses are inside the range
    assert_eq!(prefixes(&lens, "1.1.1.0").len(), 1);
    assert_eq!(prefixes(&lens, "1.1.1.255").len(), 1);
    assert!(lens.lookup("1.1.2.0").unwrap().is_empty());
}

#[test]
fn test_ipv6_lookup() {
    let repo = Arc::new(MemoryRouteRepository::new());
    refresher(repo.clone(), Arc::new(fixture_fetcher()))
        .refresh_all(&CancellationToken::new())
        .unwrap();
    let lens = RouteLens::new(repo);

    let found = lens.lookup("2001:4860:4860::8888").unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|r| r.asn == 15169));

    let found = lens.lookup("2606:4700:4700::1111").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].country_code, "US");
}

#[test]
fn test_asn_lookup_with_and_without_prefix() {
    let repo = Arc::new(MemoryRouteRepository::new());
    refresher(repo.clone(), Arc::new(fixture_fetcher()))
        .refresh_all(&CancellationToken::new())
        .unwrap();
    let lens = RouteLens::new(repo);

    let bare = lens.lookup("13335").unwrap();
    assert_eq!(bare.len(), 3);
    assert_eq!(bare, lens.lookup("AS13335").unwrap());
    assert_eq!(bare, lens.lookup("as13335").unwrap());
}

#[test]
fn test_owner_lookup_is_case_insensitive_substring() {
    let repo = Arc::new(MemoryRouteRepository::new());
    refresher(repo.clone(), Arc::new(fixture_fetcher()))
        .refresh_all(&CancellationToken::new())
        .unwrap();
    let lens = RouteLens::new(repo);

    let found = lens.lookup("cloudflare").unwrap();
    assert_eq!(found.len(), 3);
    assert!(found
        .iter()
        .all(|r| r.owner == "CLOUDFLARENET - Cloudflare, Inc."));

    let level3 = lens.lookup("level 3 parent").unwrap();
    assert_eq!(level3.len(), 2);
    assert_eq!(level3[0].owner, "LEVEL3 - Level 3 Parent, LLC");
}

#[test]
fn test_unknown_asn_gets_placeholder_detail() {
    let repo = Arc::new(MemoryRouteRepository::new());
    refresher(repo.clone(), Arc::new(fixture_fetcher()))
        .refresh_all(&CancellationToken::new())
        .unwrap();

    let found = RouteLens::new(repo).lookup("AS64500").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].owner, "Unknown");
    assert_eq!(found[0].country_code, "Unknown");
}

// ============================================================================
// Tests: partial refresh
// ============================================================================

#[test]
fn test_family_refresh_carries_other_family_forward() {
    let repo = Arc::new(MemoryRouteRepository::new());
    let fetcher = Arc::new(fixture_fetcher());
    let refresher = refresher(repo.clone(), fetcher.clone());
    let cancel = CancellationToken::new();

    refresher.refresh_all(&cancel).unwrap();

    fetcher.set_feed(IPV6_FEED, "2606:4700::/32\t13335\n");
    let summary = refresher.refresh(&[IpFamily::V6], &cancel).unwrap();

    assert_eq!(summary.families, vec![IpFamily::V6]);
    assert_eq!(summary.carried_forward, 7);
    assert_eq!(summary.ipv4_inserted, 0);
    assert_eq!(summary.ipv6_inserted, 1);
    assert_eq!(repo.count_generation(2, Some(IpFamily::V4)).unwrap(), 7);
    assert_eq!(repo.count_generation(2, Some(IpFamily::V6)).unwrap(), 1);

    let lens = RouteLens::new(repo);
    assert_eq!(lens.lookup("8.8.8.8").unwrap().len(), 3);
    assert!(lens.lookup("2001:4860::1").unwrap().is_empty());
}

#[test]
fn test_empty_family_list_refreshes_everything() {
    let repo = Arc::new(MemoryRouteRepository::new());
    let summary = refresher(repo, Arc::new(fixture_fetcher()))
        .refresh(&[], &CancellationToken::new())
        .unwrap();
    assert_eq!(summary.families, vec![IpFamily::V4, IpFamily::V6]);
    assert_eq!(summary.inserted(), 10);
}

// ============================================================================
// Tests: failures leave the current generation live
// ============================================================================

#[test]
fn test_storage_failure_keeps_previous_generation() {
    let inner = Arc::new(MemoryRouteRepository::new());
    let repo = Arc::new(FailingRouteRepository::new(inner.clone()));
    let refresher = refresher(repo.clone(), Arc::new(fixture_fetcher()));
    let cancel = CancellationToken::new();
    refresher.refresh_all(&cancel).unwrap();

    // Act - second batch of the next cycle fails
    repo.fail_inserts_after(1);
    let result = refresher.refresh_all(&cancel);

    // Assert
    assert!(matches!(result, Err(RefreshError::Repository(_))));
    assert_eq!(inner.current_generation().unwrap(), 1);
    assert_eq!(inner.count_generation(2, None).unwrap(), 2);
    let lens = RouteLens::new(repo.clone());
    assert_eq!(lens.lookup("8.8.8.8").unwrap().len(), 3);

    // orphaned rows of the failed cycle are purged by the next one
    repo.heal();
    let summary = refresher.refresh_all(&cancel).unwrap();
    assert_eq!(summary.purged, 2);
    assert_eq!(summary.generation, 2);
    assert_eq!(inner.count_generation(2, None).unwrap(), 10);
}

#[test]
fn test_fetch_failure_keeps_previous_generation() {
    let repo = Arc::new(MemoryRouteRepository::new());
    let fetcher = Arc::new(fixture_fetcher());
    let refresher = refresher(repo.clone(), fetcher.clone());
    let cancel = CancellationToken::new();
    refresher.refresh_all(&cancel).unwrap();

    fetcher.remove_feed(IPV6_FEED);
    let result = refresher.refresh_all(&cancel);

    assert!(matches!(
        result,
        Err(RefreshError::Fetch(FetchError::Status { status: 404, .. }))
    ));
    assert_eq!(repo.current_generation().unwrap(), 1);
    assert_eq!(repo.count_generation(1, None).unwrap(), 10);
}

#[test]
fn test_asn_detail_fetch_failure_aborts_before_any_insert() {
    let repo = Arc::new(MemoryRouteRepository::new());
    let fetcher = Arc::new(fixture_fetcher());
    fetcher.remove_feed(ASN_FEED);

    let result = refresher(repo.clone(), fetcher).refresh_all(&CancellationToken::new());

    assert!(matches!(result, Err(RefreshError::Fetch(_))));
    assert_eq!(repo.current_generation().unwrap(), 0);
    assert_eq!(repo.count_generation(1, None).unwrap(), 0);
}

#[test]
fn test_mid_stream_read_failure_aborts() {
    let repo = Arc::new(MemoryRouteRepository::new());
    let fetcher = Arc::new(fixture_fetcher());
    fetcher.fail_mid_stream(IPV4_FEED, IPV4_ROUTES, 40);

    let result = refresher(repo.clone(), fetcher).refresh_all(&CancellationToken::new());

    assert!(matches!(
        result,
        Err(RefreshError::Fetch(FetchError::Read { .. }))
    ));
    assert_eq!(repo.current_generation().unwrap(), 0);
}

#[test]
fn test_malformed_prefix_aborts() {
    let repo = Arc::new(MemoryRouteRepository::new());
    let fetcher = Arc::new(fixture_fetcher());
    fetcher.set_feed(IPV4_FEED, "1.1.1.0/24\t13335\n1.2.3.999/24\t13335\n");

    let result = refresher(repo.clone(), fetcher).refresh_all(&CancellationToken::new());

    match result {
        Err(RefreshError::Parse(e)) => assert_eq!(e.line, 2),
        other => panic!("expected parse error, got {:?}", other.map(|s| s.to_string())),
    }
    assert_eq!(repo.current_generation().unwrap(), 0);
}

#[test]
fn test_cancelled_refresh_does_not_cut_over() {
    let repo = Arc::new(MemoryRouteRepository::new());
    let refresher = refresher(repo.clone(), Arc::new(fixture_fetcher()));
    refresher.refresh_all(&CancellationToken::new()).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = refresher.refresh_all(&cancel);

    assert!(matches!(result, Err(RefreshError::Cancelled("route"))));
    assert_eq!(repo.current_generation().unwrap(), 1);
    assert!(!refresher.is_running());
}

// ============================================================================
// Tests: single flight
// ============================================================================

#[test]
fn test_concurrent_refresh_is_rejected() {
    let repo = Arc::new(MemoryRouteRepository::new());
    let fetcher = Arc::new(fixture_fetcher());
    let gate = fetcher.gate(ASN_FEED);
    let refresher = Arc::new(refresher(repo.clone(), fetcher));

    let first = {
        let refresher = refresher.clone();
        std::thread::spawn(move || refresher.refresh_all(&CancellationToken::new()))
    };

    // first cycle is now blocked reading the ASN detail feed
    gate.started.recv().unwrap();
    assert!(refresher.is_running());
    let second = refresher.refresh_all(&CancellationToken::new());
    assert!(matches!(second, Err(RefreshError::AlreadyRunning("route"))));

    gate.release.send(()).unwrap();
    let summary = first.join().unwrap().unwrap();
    assert_eq!(summary.generation, 1);
    assert!(!refresher.is_running());
    assert_eq!(repo.current_generation().unwrap(), 1);
}
