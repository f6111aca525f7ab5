//! Bounded rolling history of observations per metric.

use std::collections::VecDeque;

use dashmap::DashMap;

/// Rolling per-metric store of numeric observations.
///
/// Each metric key owns a bounded FIFO ring: appends are O(1) amortized and
/// evict the oldest value once the ring is full. A key's ring is locked only
/// for the duration of a single append or copy, and different keys live in
/// different map shards, so writers on distinct metrics proceed in parallel.
pub struct MetricHistory {
    rings: DashMap<String, VecDeque<f64>>,
    capacity: usize,
}

impl MetricHistory {
    /// Create a store keeping at most `capacity` observations per metric.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            rings: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append an observation, evicting the oldest if the ring is full.
    pub fn record(&self, metric: &str, value: f64) {
        let mut ring = self.rings.entry(metric.to_owned()).or_default();
        if ring.len() == self.capacity {
            let _ = ring.pop_front();
        }
        ring.push_back(value);
    }

    /// Point-in-time copy of a metric's observations, in arrival order.
    ///
    /// Never a live view: the engine computes over the returned buffer while
    /// new observations keep arriving. Unknown metrics yield an empty buffer.
    #[must_use]
    pub fn snapshot(&self, metric: &str) -> Vec<f64> {
        self.rings
            .get(metric)
            .map(|ring| ring.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All metric keys currently known to the store.
    #[must_use]
    pub fn metric_keys(&self) -> Vec<String> {
        self.rings.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of observations held for a metric.
    #[must_use]
    pub fn len(&self, metric: &str) -> usize {
        self.rings.get(metric).map_or(0, |ring| ring.len())
    }

    /// Whether nothing has been recorded for a metric.
    #[must_use]
    pub fn is_empty(&self, metric: &str) -> bool {
        self.len(metric) == 0
    }
}
