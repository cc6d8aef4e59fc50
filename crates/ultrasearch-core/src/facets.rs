//! Auxiliary grouped-count queries: facets and per-type subtotals.
//!
//! Both aggregators derive their requests from the main search request and
//! issue them through the shared [`RetryExecutor`], so the grouped counts
//! always reflect the same query, filters and weights as the result page.

use crate::class_map::ClassIdMap;
use crate::daemon::DaemonClient;
use crate::error::Result;
use crate::request::{DaemonRequest, CLASS_ID_ATTRIBUTE, GROUP_SORT_BY_COUNT};
use crate::retry::RetryExecutor;
use crate::types::{FilterValue, Scalar};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Distinct field values and the number of matches carrying each.
pub type FacetCounts = BTreeMap<String, u64>;

/// A facet cache shared between searches.
pub type SharedFacetCache = Arc<Mutex<FacetCache>>;

/// Identifies one facet computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FacetKey {
    parsed_query: String,
    fingerprint: String,
    field: String,
}

impl FacetKey {
    fn new(parsed_query: &str, request: &DaemonRequest, field: &str) -> Self {
        FacetKey {
            parsed_query: parsed_query.to_string(),
            fingerprint: format!("{:?}", request),
            field: field.to_string(),
        }
    }
}

/// Facet counts keyed by parsed query, request and field.
///
/// The cache has no expiry; hosts decide when to [`clear`](Self::clear) it,
/// typically after reindexing.
#[derive(Debug, Default)]
pub struct FacetCache {
    entries: HashMap<FacetKey, FacetCounts>,
}

impl FacetCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache ready for sharing
    pub fn shared() -> SharedFacetCache {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Number of cached facet computations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached computation
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Computes facet counts with one grouped query per field.
pub struct FacetAggregator<'a, D> {
    daemon: &'a D,
    retry: &'a RetryExecutor,
    max_facets: usize,
}

impl<'a, D: DaemonClient> FacetAggregator<'a, D> {
    /// Create an aggregator keeping at most `max_facets` values per field
    pub fn new(daemon: &'a D, retry: &'a RetryExecutor, max_facets: usize) -> Self {
        FacetAggregator {
            daemon,
            retry,
            max_facets,
        }
    }

    /// Facet counts for every field in `fields`.
    pub fn facets(
        &self,
        base: &DaemonRequest,
        parsed_query: &str,
        fields: &[String],
        cache: Option<&SharedFacetCache>,
    ) -> Result<BTreeMap<String, FacetCounts>> {
        let mut facets = BTreeMap::new();
        for field in fields {
            let counts = match cache {
                Some(cache) => self.cached_facet(cache, base, parsed_query, field)?,
                None => self.facet(base, parsed_query, field)?,
            };
            facets.insert(field.clone(), counts);
        }
        Ok(facets)
    }

    /// Facet counts for a single field.
    pub fn facet(
        &self,
        base: &DaemonRequest,
        parsed_query: &str,
        field: &str,
    ) -> Result<FacetCounts> {
        let mut request = base.clone();
        request.set_group_by(field, GROUP_SORT_BY_COUNT);
        request.set_limits(0, self.max_facets.min(base.max_matches), base.max_matches);

        let response = self
            .retry
            .run("facet", || self.daemon.query(&request, parsed_query))?;

        let mut counts = FacetCounts::new();
        for group in response.groups {
            *counts.entry(group.value).or_insert(0) += group.count;
        }

        let counts = truncate_facets(counts, self.max_facets);
        debug!(field, values = counts.len(), "Computed facet");
        Ok(counts)
    }

    fn cached_facet(
        &self,
        cache: &SharedFacetCache,
        base: &DaemonRequest,
        parsed_query: &str,
        field: &str,
    ) -> Result<FacetCounts> {
        let key = FacetKey::new(parsed_query, base, field);
        if let Some(counts) = cache.lock().entries.get(&key) {
            debug!(field, "Facet cache hit");
            return Ok(counts.clone());
        }

        // Not held across the daemon round trip
        let counts = self.facet(base, parsed_query, field)?;
        cache.lock().entries.insert(key, counts.clone());
        Ok(counts)
    }
}

/// Keep the `max` values with the highest counts.
///
/// Ties are broken by value so that truncation is deterministic.
pub fn truncate_facets(counts: FacetCounts, max: usize) -> FacetCounts {
    if counts.len() <= max {
        return counts;
    }

    let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
    ranked.sort_by(|(a_value, a_count), (b_value, b_count)| {
        b_count.cmp(a_count).then_with(|| a_value.cmp(b_value))
    });
    ranked.truncate(max);
    ranked.into_iter().collect()
}

/// Computes per-type match totals with one restricted query per type.
pub struct SubtotalAggregator<'a, D> {
    daemon: &'a D,
    retry: &'a RetryExecutor,
    class_map: &'a ClassIdMap,
}

impl<'a, D: DaemonClient> SubtotalAggregator<'a, D> {
    /// Create an aggregator over every type in `class_map`
    pub fn new(daemon: &'a D, retry: &'a RetryExecutor, class_map: &'a ClassIdMap) -> Self {
        SubtotalAggregator {
            daemon,
            retry,
            class_map,
        }
    }

    /// Total matches per entity-type name, capped at the request's
    /// `max_matches`.
    pub fn subtotals(
        &self,
        base: &DaemonRequest,
        parsed_query: &str,
    ) -> Result<BTreeMap<String, u64>> {
        let mut subtotals = BTreeMap::new();
        for (class_name, class_id) in self.class_map.iter() {
            let mut request = base.clone();
            request.set_filter(
                CLASS_ID_ATTRIBUTE,
                FilterValue::Equals(Scalar::Int(class_id as i64)),
            );
            request.set_limits(0, 1, base.max_matches);

            let response = self
                .retry
                .run("subtotal", || self.daemon.query(&request, parsed_query))?;

            let total = response.total_found.min(base.max_matches as u64);
            subtotals.insert(class_name.to_string(), total);
        }
        Ok(subtotals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::GroupCount;
    use crate::error::SearchError;
    use crate::testing::StubDaemon;
    use std::time::Duration;

    fn retry() -> RetryExecutor {
        RetryExecutor::new(2, Duration::ZERO)
    }

    #[test]
    fn test_facet_groups_on_field() {
        let daemon = StubDaemon::new().with_groups(
            "color",
            vec![GroupCount::new("red", 10), GroupCount::new("blue", 5)],
        );
        let retry = retry();
        let aggregator = FacetAggregator::new(&daemon, &retry, 100);

        let counts = aggregator
            .facet(&DaemonRequest::default(), "dog | cat", "color")
            .unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["red"], 10);
        assert_eq!(counts["blue"], 5);

        let queries = daemon.queries();
        assert_eq!(queries.len(), 1);
        let (request, query) = &queries[0];
        assert_eq!(query, "dog | cat");
        assert_eq!(request.group_by.as_deref(), Some("color"));
        assert_eq!(request.group_sort.as_deref(), Some(GROUP_SORT_BY_COUNT));
        assert_eq!(request.offset, 0);
        assert_eq!(request.limit, 100);
    }

    #[test]
    fn test_duplicate_group_values_are_summed() {
        let daemon = StubDaemon::new().with_groups(
            "color",
            vec![GroupCount::new("red", 3), GroupCount::new("red", 4)],
        );
        let retry = retry();

        let counts = FacetAggregator::new(&daemon, &retry, 100)
            .facet(&DaemonRequest::default(), "dog", "color")
            .unwrap();
        assert_eq!(counts["red"], 7);
    }

    #[test]
    fn test_truncation_keeps_highest_counts() {
        let counts: FacetCounts = [("a", 1), ("b", 9), ("c", 5), ("d", 5), ("e", 2)]
            .into_iter()
            .map(|(value, count)| (value.to_string(), count))
            .collect();

        let truncated = truncate_facets(counts, 3);
        assert_eq!(
            truncated.into_iter().collect::<Vec<_>>(),
            vec![
                ("b".to_string(), 9),
                ("c".to_string(), 5),
                ("d".to_string(), 5)
            ]
        );
    }

    #[test]
    fn test_facet_cache_skips_repeat_queries() {
        let daemon = StubDaemon::new().with_groups("color", vec![GroupCount::new("red", 1)]);
        let retry = retry();
        let cache = FacetCache::shared();
        let aggregator = FacetAggregator::new(&daemon, &retry, 100);
        let fields = vec!["color".to_string()];

        let first = aggregator
            .facets(&DaemonRequest::default(), "dog", &fields, Some(&cache))
            .unwrap();
        let second = aggregator
            .facets(&DaemonRequest::default(), "dog", &fields, Some(&cache))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(daemon.queries().len(), 1);
        assert_eq!(cache.lock().len(), 1);

        // A different query is a different computation
        aggregator
            .facets(&DaemonRequest::default(), "cat", &fields, Some(&cache))
            .unwrap();
        assert_eq!(daemon.queries().len(), 2);
    }

    #[test]
    fn test_facet_retries_transient_failures() {
        let daemon = StubDaemon::new()
            .with_groups("color", vec![GroupCount::new("red", 1)])
            .fail_with(SearchError::transient("connection refused"));
        let retry = retry();

        let counts = FacetAggregator::new(&daemon, &retry, 100)
            .facet(&DaemonRequest::default(), "dog", "color")
            .unwrap();
        assert_eq!(counts["red"], 1);
        assert_eq!(daemon.queries().len(), 2);
    }

    #[test]
    fn test_subtotals_per_class() {
        let map = ClassIdMap::from_pairs([("Seller", 0), ("User", 1)]);
        let daemon = StubDaemon::new()
            .with_class_total(0, 12)
            .with_class_total(1, 5000);
        let retry = retry();

        let mut base = DaemonRequest::default();
        base.max_matches = 1000;
        let subtotals = SubtotalAggregator::new(&daemon, &retry, &map)
            .subtotals(&base, "dog")
            .unwrap();

        assert_eq!(subtotals["Seller"], 12);
        assert_eq!(subtotals["User"], 1000);

        let queries = daemon.queries();
        assert_eq!(queries.len(), 2);
        assert_eq!(
            queries[1].0.filter(CLASS_ID_ATTRIBUTE),
            Some(&FilterValue::Equals(Scalar::Int(1)))
        );
    }
}
