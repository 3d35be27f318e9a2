//! Property-based tests using proptest
//!
//! These tests verify the region and service selection rules and the retry
//! backoff schedule using randomized inputs.

use std::collections::BTreeSet;
use std::time::Duration;

use gcp_inventory::filter::{RegionFilter, ServiceFilter};
use gcp_inventory::loader::{backoff, LoaderOptions};
use gcp_inventory::orchestrator::all_service_names;
use proptest::prelude::*;

/// Generate region-like names
fn arb_region() -> impl Strategy<Value = String> {
    (
        prop_oneof!["us", "europe", "asia", "australia", "southamerica"],
        prop_oneof!["central", "east", "west", "north", "south"],
        1u8..10,
    )
        .prop_map(|(area, direction, n)| format!("{}-{}{}", area, direction, n))
}

fn arb_regions() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_region(), 0..20)
}

/// A subset of the known service names
fn arb_services() -> impl Strategy<Value = Vec<String>> {
    let names: Vec<String> = all_service_names().into_iter().map(String::from).collect();
    prop::sample::subsequence(names.clone(), 0..=names.len())
}

fn resolve(filter: &RegionFilter, listed: Vec<String>) -> Vec<String> {
    tokio_test::block_on(filter.resolve(|| async move { Ok(listed) })).unwrap()
}

proptest! {
    /// An empty service filter selects every service
    #[test]
    fn empty_service_filter_allows_all(service in "[a-z]{1,15}") {
        prop_assert!(ServiceFilter::all().allows(&service));
    }

    /// Exclusion wins over inclusion for services
    #[test]
    fn service_exclude_wins(include in arb_services(), exclude in arb_services()) {
        let filter = ServiceFilter::new(&include, &exclude);
        for name in all_service_names() {
            let expected = !exclude.iter().any(|e| e == name)
                && (include.is_empty() || include.iter().any(|i| i == name));
            prop_assert_eq!(filter.allows(name), expected);
        }
    }

    /// Service names match regardless of case
    #[test]
    fn service_filter_is_case_insensitive(include in arb_services()) {
        let upper: Vec<String> = include.iter().map(|s| s.to_uppercase()).collect();
        let lower = ServiceFilter::new(&include, Vec::<String>::new());
        let shouty = ServiceFilter::new(&upper, Vec::<String>::new());
        for name in all_service_names() {
            prop_assert_eq!(lower.allows(name), shouty.allows(name));
            prop_assert_eq!(lower.allows(name), lower.allows(&name.to_uppercase()));
        }
    }

    /// Resolved regions never contain an excluded region, are sorted and unique
    #[test]
    fn resolved_regions_exclude_and_sort(
        include in arb_regions(),
        exclude in arb_regions(),
        listed in arb_regions(),
    ) {
        let filter = RegionFilter::new(&include, &exclude);
        let resolved = resolve(&filter, listed.clone());

        for region in &resolved {
            prop_assert!(!exclude.contains(region));
        }

        let mut sorted = resolved.clone();
        sorted.sort();
        sorted.dedup();
        prop_assert_eq!(&sorted, &resolved);

        let source: BTreeSet<&String> = if include.is_empty() {
            listed.iter().collect()
        } else {
            include.iter().collect()
        };
        for region in &resolved {
            prop_assert!(source.contains(region));
        }
    }

    /// Explicit regions are used as given, minus exclusions, without listing
    #[test]
    fn explicit_regions_ignore_listing(
        include in prop::collection::vec(arb_region(), 1..10),
        listed in arb_regions(),
    ) {
        let filter = RegionFilter::new(&include, Vec::<String>::new());
        let resolved = resolve(&filter, listed);
        let expected: Vec<String> = include.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        prop_assert_eq!(resolved, expected);
    }

    /// Backoff grows by the factor until the cap
    #[test]
    fn backoff_bounded_by_cap(
        attempt in 0u32..200,
        base_ms in 1u64..1_000,
        cap_ms in 1u64..60_000,
        factor in 1.0f64..3.0,
    ) {
        let options = LoaderOptions::default()
            .with_sleep_between_retries(Duration::from_millis(base_ms))
            .with_backoff_factor(factor)
            .with_max_backoff(Some(Duration::from_millis(cap_ms)));
        let delay = backoff(attempt, &options);
        prop_assert!(delay <= Duration::from_millis(cap_ms));
        prop_assert!(delay >= Duration::from_millis(base_ms.min(cap_ms)));
    }
}
