//! Incremental OHLCV bar store keyed by (chart, `EXCHANGE:SYMBOL`, resolution).
//!
//! Invariants held after every mutation:
//! - at most one bar per normalized (whole-second) timestamp within a bucket;
//! - buckets are sorted ascending by time;
//! - buckets only grow: merges never drop a timestamp that was already cached.
//!
//! On a timestamp collision the entry with the later raw time wins; an exact tie
//! goes to the bar merged last, so fresh upstream data replaces stale rows.
//! Cached bars are stored normalized, so their raw time is gone: a cached bar
//! competes with its whole-second time. An incoming bar that rounds up onto a
//! cached second (2_950 ms against a stored 3_000) therefore loses.

use std::{
    collections::{BTreeMap, btree_map::Entry},
    fmt,
};

use indexmap::IndexMap;

use crate::models::{bar::Bar, resolution::Resolution, symbol::FullSymbol};

/// Composite cache key: `(chart id, EXCHANGE:SYMBOL, resolution)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub chart_id: String,
    pub symbol: String,
    pub resolution: String,
}

impl CacheKey {
    pub fn new(chart_id: &str, symbol: &FullSymbol, resolution: &Resolution) -> Self {
        Self {
            chart_id: chart_id.to_string(),
            symbol: symbol.to_string(),
            resolution: resolution.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.chart_id, self.symbol, self.resolution)
    }
}

#[derive(Debug, Default, Clone)]
struct Bucket {
    bars: Vec<Bar>,
    /// Set once an older-history fetch came back empty while bars were cached.
    older_exhausted: bool,
}

#[derive(Debug, Default)]
pub struct BarCache {
    buckets: IndexMap<CacheKey, Bucket>,
}

impl BarCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bars(&self, key: &CacheKey) -> &[Bar] {
        self.buckets.get(key).map(|b| b.bars.as_slice()).unwrap_or(&[])
    }

    pub fn earliest(&self, key: &CacheKey) -> Option<i64> {
        self.bars(key).first().map(|b| b.time)
    }

    pub fn latest(&self, key: &CacheKey) -> Option<i64> {
        self.bars(key).last().map(|b| b.time)
    }

    /// Re-applies the dedup + sort rule to a bucket in place.
    pub fn normalize(&mut self, key: &CacheKey) -> &[Bar] {
        let bucket = self.buckets.entry(key.clone()).or_default();
        bucket.bars = merge_bars(&bucket.bars, &[]);
        &bucket.bars
    }

    /// Merges fetched bars into a bucket and returns the merged bucket.
    pub fn merge(&mut self, key: &CacheKey, incoming: &[Bar]) -> &[Bar] {
        let bucket = self.buckets.entry(key.clone()).or_default();
        bucket.bars = merge_bars(&bucket.bars, incoming);
        &bucket.bars
    }

    pub fn mark_older_exhausted(&mut self, key: &CacheKey) {
        self.buckets.entry(key.clone()).or_default().older_exhausted = true;
    }

    pub fn older_exhausted(&self, key: &CacheKey) -> bool {
        self.buckets.get(key).is_some_and(|b| b.older_exhausted)
    }

    /// Bars with `from_ms <= time <= to_ms`.
    pub fn slice(&self, key: &CacheKey, from_ms: i64, to_ms: i64) -> Vec<Bar> {
        let bars = self.bars(key);
        let lo = bars.partition_point(|b| b.time < from_ms);
        let hi = bars.partition_point(|b| b.time <= to_ms);
        if lo >= hi {
            return Vec::new();
        }
        bars[lo..hi].to_vec()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}

/// Dedup + sort `existing ++ incoming` by normalized timestamp.
pub fn merge_bars(existing: &[Bar], incoming: &[Bar]) -> Vec<Bar> {
    let mut by_time: BTreeMap<i64, Bar> = BTreeMap::new();
    for bar in existing.iter().chain(incoming) {
        match by_time.entry(bar.normalized_time()) {
            Entry::Vacant(slot) => {
                slot.insert(*bar);
            }
            Entry::Occupied(mut slot) => {
                if bar.time >= slot.get().time {
                    slot.insert(*bar);
                }
            }
        }
    }
    by_time.into_values().map(|b| b.normalized()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    fn bar(time: i64, close: f64) -> Bar {
        Bar {
            time,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    fn key() -> CacheKey {
        CacheKey::new(
            "chart-1",
            &FullSymbol::new("NASDAQ", "AAPL"),
            &Resolution::daily(),
        )
    }

    #[test]
    fn merge_sorts_and_collapses_sub_second_duplicates() {
        let merged = merge_bars(
            &[bar(3_000, 3.0), bar(1_000, 1.0)],
            &[bar(1_200, 1.2), bar(2_000, 2.0), bar(2_900, 2.9)],
        );
        let times: Vec<i64> = merged.iter().map(|b| b.time).collect();
        assert_eq!(times, vec![1_000, 2_000, 3_000]);
        // 1_200 is later than the cached 1_000 and wins the collision
        assert_eq!(merged[0].close, 1.2);
        // 2_900 normalizes to 3_000 but is earlier than the cached 3_000
        assert_eq!(merged[2].close, 3.0);
    }

    #[test]
    fn cached_side_competes_with_its_normalized_time() {
        let mut cache = BarCache::new();
        let k = key();
        // stored as 3_000
        cache.merge(&k, &[bar(2_900, 1.0)]);
        assert_eq!(cache.bars(&k), &[bar(3_000, 1.0)]);

        cache.merge(&k, &[bar(2_950, 2.0)]);
        assert_eq!(cache.bars(&k), &[bar(3_000, 1.0)]);

        cache.merge(&k, &[bar(3_000, 3.0)]);
        assert_eq!(cache.bars(&k), &[bar(3_000, 3.0)]);
    }

    #[test]
    fn exact_tie_prefers_incoming() {
        let merged = merge_bars(&[bar(5_000, 1.0)], &[bar(5_000, 9.0)]);
        assert_eq!(merged, vec![bar(5_000, 9.0)]);
    }

    #[test]
    fn bucket_bookkeeping() {
        let mut cache = BarCache::new();
        let k = key();
        assert!(cache.bars(&k).is_empty());
        assert_eq!(cache.earliest(&k), None);

        cache.merge(&k, &[bar(4_000, 4.0), bar(2_000, 2.0)]);
        cache.merge(&k, &[bar(6_000, 6.0)]);
        assert_eq!(cache.earliest(&k), Some(2_000));
        assert_eq!(cache.latest(&k), Some(6_000));
        assert_eq!(cache.slice(&k, 3_000, 6_000).len(), 2);
        assert!(cache.slice(&k, 7_000, 9_000).is_empty());
        assert!(cache.slice(&k, 5_000, 3_000).is_empty());

        assert!(!cache.older_exhausted(&k));
        cache.mark_older_exhausted(&k);
        assert!(cache.older_exhausted(&k));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn keys_are_isolated_per_chart() {
        let mut cache = BarCache::new();
        let a = key();
        let b = CacheKey {
            chart_id: "chart-2".into(),
            ..key()
        };
        cache.merge(&a, &[bar(1_000, 1.0)]);
        assert!(cache.bars(&b).is_empty());
        assert_eq!(a.to_string(), "chart-1|NASDAQ:AAPL|1D");
    }

    proptest! {
        #[test]
        fn merge_twice_is_deduplicated_and_sorted(
            times in proptest::collection::vec(0i64..100_000, 0..64),
            overlap in 0usize..64,
        ) {
            let bars: Vec<Bar> = times.iter().map(|&t| bar(t, t as f64)).collect();
            let subset: Vec<Bar> = bars.iter().take(overlap).copied().collect();

            let mut cache = BarCache::new();
            let k = key();
            cache.merge(&k, &bars);
            let merged = cache.merge(&k, &subset).to_vec();

            let distinct: BTreeSet<i64> = bars.iter().map(Bar::normalized_time).collect();
            prop_assert_eq!(merged.len(), distinct.len());
            prop_assert!(merged.windows(2).all(|w| w[0].time < w[1].time));
            prop_assert!(merged.iter().all(|b| b.time % 1000 == 0));
        }
    }
}
