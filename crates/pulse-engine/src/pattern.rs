//! Registered patterns and per-metric thresholds.
//!
//! A [`Pattern`] is an opaque matching rule over a full data record plus a
//! confidence function. Patterns are registered once and read-only during
//! matching; registration is last-write-wins and atomic with respect to
//! concurrent matching.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::engine::DataRecord;

type PredicateFn = dyn Fn(&DataRecord) -> bool + Send + Sync;
type ConfidenceFn = dyn Fn(&DataRecord) -> f64 + Send + Sync;

/// A named matching rule with a confidence function.
pub struct Pattern {
    name: String,
    predicate: Arc<PredicateFn>,
    confidence: Arc<ConfidenceFn>,
}

impl Pattern {
    /// Create a pattern from a predicate and a confidence function.
    ///
    /// The confidence function must be deterministic; its output is clamped
    /// to [0.0, 1.0] when an insight is emitted.
    pub fn new<P, C>(name: impl Into<String>, predicate: P, confidence: C) -> Self
    where
        P: Fn(&DataRecord) -> bool + Send + Sync + 'static,
        C: Fn(&DataRecord) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            confidence: Arc::new(confidence),
        }
    }

    /// The name this pattern was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Test the predicate against a data record.
    #[must_use]
    pub fn matches(&self, record: &DataRecord) -> bool {
        (self.predicate)(record)
    }

    /// Compute the confidence for a matching record, clamped to [0.0, 1.0].
    #[must_use]
    pub fn confidence(&self, record: &DataRecord) -> f64 {
        (self.confidence)(record).clamp(0.0, 1.0)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern").field("name", &self.name).finish()
    }
}

/// Registry of patterns, keyed and matched in name order.
#[derive(Default)]
pub struct PatternRegistry {
    patterns: RwLock<BTreeMap<String, Arc<Pattern>>>,
}

impl PatternRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pattern, replacing any prior one of the same name.
    pub fn register(&self, pattern: Pattern) {
        let name = pattern.name().to_owned();
        let _ = self.patterns.write().insert(name, Arc::new(pattern));
    }

    /// Point-in-time list of registered patterns, in name order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Pattern>> {
        self.patterns.read().values().cloned().collect()
    }

    /// Number of registered patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.read().len()
    }

    /// Whether no patterns are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.read().is_empty()
    }
}

/// Per-metric anomaly thresholds, settable at runtime.
#[derive(Default)]
pub struct ThresholdMap {
    thresholds: DashMap<String, f64>,
}

impl ThresholdMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the threshold for a metric.
    pub fn set(&self, metric: &str, threshold: f64) {
        let _ = self.thresholds.insert(metric.to_owned(), threshold);
    }

    /// Threshold for a metric; 0.0 when unset.
    #[must_use]
    pub fn get(&self, metric: &str) -> f64 {
        self.thresholds.get(metric).map_or(0.0, |v| *v)
    }
}
