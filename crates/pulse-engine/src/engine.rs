//! Insight derivation over shared metric history.
//!
//! [`InsightEngine::evaluate`] takes one data record (metric name → numeric
//! value), derives insights from the history as it stood *before* the record
//! arrived, then appends the record's values. Detection on the pre-update
//! snapshot keeps results deterministic regardless of how evaluation
//! interleaves with concurrent appends on other keys.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use pulse_core::error::BrokerError;
use pulse_core::insight::{Insight, InsightBase, TrendDirection};
use pulse_core::BrokerConfig;

use crate::history::MetricHistory;
use crate::pattern::{PatternRegistry, ThresholdMap};

/// One ingested reading: metric name → numeric value.
pub type DataRecord = Map<String, Value>;

/// Derives anomaly, trend, and pattern-match insights.
pub struct InsightEngine {
    history: Arc<MetricHistory>,
    patterns: Arc<PatternRegistry>,
    thresholds: Arc<ThresholdMap>,
    anomaly_sigma: f64,
    trend_floor: f64,
}

impl InsightEngine {
    /// Create an engine over shared history and registries.
    #[must_use]
    pub fn new(
        history: Arc<MetricHistory>,
        patterns: Arc<PatternRegistry>,
        thresholds: Arc<ThresholdMap>,
        config: &BrokerConfig,
    ) -> Self {
        Self {
            history,
            patterns,
            thresholds,
            anomaly_sigma: config.anomaly_sigma,
            trend_floor: config.trend_floor,
        }
    }

    /// The shared history this engine reads and extends.
    #[must_use]
    pub fn history(&self) -> &Arc<MetricHistory> {
        &self.history
    }

    /// Evaluate one data record and extend history with its values.
    ///
    /// Output order: pattern matches first (a pattern is a property of the
    /// whole record), then per metric in record key order an anomaly insight
    /// followed by a trend insight, each emitted only when its rule fires.
    ///
    /// A non-numeric value anywhere in the record fails the whole call with
    /// a validation error; no partial insights are returned and history is
    /// left untouched.
    pub fn evaluate(&self, record: &DataRecord) -> Result<Vec<Insight>, BrokerError> {
        // Validate the whole record up front.
        let mut readings: Vec<(&str, f64)> = Vec::with_capacity(record.len());
        for (metric, value) in record {
            let Some(v) = value.as_f64() else {
                return Err(BrokerError::validation(format!(
                    "metric '{metric}' has non-numeric value: {value}"
                )));
            };
            readings.push((metric, v));
        }

        let mut insights = Vec::new();

        for pattern in self.patterns.snapshot() {
            if pattern.matches(record) {
                insights.push(Insight::PatternMatch {
                    base: InsightBase::now(),
                    name: pattern.name().to_owned(),
                    confidence: pattern.confidence(record),
                });
            }
        }

        for &(metric, value) in &readings {
            let prior = self.history.snapshot(metric);
            if let Some(anomaly) = self.detect_anomaly(metric, value, &prior) {
                insights.push(anomaly);
            }
            if let Some(trend) = self.detect_trend(metric, &prior) {
                insights.push(trend);
            }
            self.history.record(metric, value);
        }

        debug!(
            metrics = record.len(),
            insights = insights.len(),
            "evaluated data record"
        );
        Ok(insights)
    }

    /// Flag `value` when it deviates more than `anomaly_sigma` standard
    /// deviations from the prior window's mean. Requires at least one prior
    /// observation and a nonzero deviation; with zero history nothing is
    /// ever anomalous.
    fn detect_anomaly(&self, metric: &str, value: f64, prior: &[f64]) -> Option<Insight> {
        if prior.is_empty() {
            return None;
        }
        let count = prior.len() as f64;
        let mean = prior.iter().sum::<f64>() / count;
        let variance = prior.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / count;
        let std_dev = variance.sqrt();
        if std_dev == 0.0 || (value - mean).abs() <= self.anomaly_sigma * std_dev {
            return None;
        }
        Some(Insight::Anomaly {
            base: InsightBase::now(),
            metric: metric.to_owned(),
            value,
            threshold: self.thresholds.get(metric),
        })
    }

    /// Slope over the prior window: (last − first) / count, needing at least
    /// two points. Slopes below `trend_floor` in magnitude are silently
    /// dropped.
    fn detect_trend(&self, metric: &str, prior: &[f64]) -> Option<Insight> {
        if prior.len() < 2 {
            return None;
        }
        let slope = (prior[prior.len() - 1] - prior[0]) / prior.len() as f64;
        let magnitude = slope.abs();
        if magnitude < self.trend_floor {
            return None;
        }
        Some(Insight::Trend {
            base: InsightBase::now(),
            metric: metric.to_owned(),
            direction: if slope > 0.0 {
                TrendDirection::Up
            } else {
                TrendDirection::Down
            },
            magnitude,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;
    use assert_matches::assert_matches;
    use pulse_core::error::VALIDATION_ERROR;
    use serde_json::json;

    fn engine() -> InsightEngine {
        engine_with(&BrokerConfig::default())
    }

    fn engine_with(config: &BrokerConfig) -> InsightEngine {
        InsightEngine::new(
            Arc::new(MetricHistory::new(config.history_capacity)),
            Arc::new(PatternRegistry::new()),
            Arc::new(ThresholdMap::new()),
            config,
        )
    }

    fn record(pairs: &[(&str, f64)]) -> DataRecord {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), json!(v)))
            .collect()
    }

    fn seed(engine: &InsightEngine, metric: &str, values: &[f64]) {
        for &v in values {
            engine.history.record(metric, v);
        }
    }

    #[test]
    fn empty_history_never_anomalous() {
        let engine = engine();
        let insights = engine.evaluate(&record(&[("cpu", 1_000_000.0)])).unwrap();
        assert!(insights.is_empty());
        // But the value was appended for next time.
        assert_eq!(engine.history.snapshot("cpu"), vec![1_000_000.0]);
    }

    #[test]
    fn zero_deviation_never_anomalous() {
        let engine = engine();
        seed(&engine, "flat", &[5.0, 5.0, 5.0, 5.0]);
        let insights = engine.evaluate(&record(&[("flat", 5000.0)])).unwrap();
        assert!(insights
            .iter()
            .all(|i| i.insight_type() != "anomaly"));
    }

    #[test]
    fn outlier_after_ramp_is_anomalous() {
        let engine = engine();
        seed(&engine, "reqs", &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let insights = engine.evaluate(&record(&[("reqs", 100.0)])).unwrap();
        assert_matches!(
            insights.iter().find(|i| i.insight_type() == "anomaly"),
            Some(Insight::Anomaly { metric, value, threshold, .. }) => {
                assert_eq!(metric, "reqs");
                assert_eq!(*value, 100.0);
                assert_eq!(*threshold, 0.0);
            }
        );
    }

    #[test]
    fn anomaly_carries_configured_threshold() {
        let history = Arc::new(MetricHistory::new(100));
        let thresholds = Arc::new(ThresholdMap::new());
        thresholds.set("reqs", 42.0);
        let engine = InsightEngine::new(
            history,
            Arc::new(PatternRegistry::new()),
            thresholds,
            &BrokerConfig::default(),
        );
        seed(&engine, "reqs", &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let insights = engine.evaluate(&record(&[("reqs", 100.0)])).unwrap();
        assert_matches!(
            insights.iter().find(|i| i.insight_type() == "anomaly"),
            Some(Insight::Anomaly { threshold, .. }) => assert_eq!(*threshold, 42.0)
        );
    }

    #[test]
    fn detection_uses_pre_update_snapshot() {
        let engine = engine();
        seed(&engine, "m", &[10.0, 10.0, 10.0]);
        // 10s have zero deviation; the arriving outlier must not be part of
        // the window it is judged against.
        let insights = engine.evaluate(&record(&[("m", 500.0)])).unwrap();
        assert!(insights.iter().all(|i| i.insight_type() != "anomaly"));
        // A second outlier now sees nonzero deviation from the first.
        let insights = engine.evaluate(&record(&[("m", 500_000.0)])).unwrap();
        assert!(insights.iter().any(|i| i.insight_type() == "anomaly"));
    }

    #[test]
    fn trend_over_ramp() {
        let engine = engine();
        seed(&engine, "reqs", &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let insights = engine.evaluate(&record(&[("reqs", 6.0)])).unwrap();
        assert_matches!(
            insights.iter().find(|i| i.insight_type() == "trend"),
            Some(Insight::Trend { direction, magnitude, .. }) => {
                assert_eq!(*direction, TrendDirection::Up);
                // (5 - 1) / 5
                assert!((magnitude - 0.8).abs() < 1e-12);
            }
        );
    }

    #[test]
    fn downward_trend() {
        let engine = engine();
        seed(&engine, "m", &[10.0, 8.0, 6.0]);
        let insights = engine.evaluate(&record(&[("m", 4.0)])).unwrap();
        assert_matches!(
            insights.iter().find(|i| i.insight_type() == "trend"),
            Some(Insight::Trend { direction, .. }) => assert_eq!(*direction, TrendDirection::Down)
        );
    }

    #[test]
    fn flat_slope_below_floor_is_dropped() {
        let engine = engine();
        seed(&engine, "m", &[100.0, 100.001, 100.002]);
        let insights = engine.evaluate(&record(&[("m", 100.003)])).unwrap();
        assert!(insights.iter().all(|i| i.insight_type() != "trend"));
    }

    #[test]
    fn single_prior_point_has_no_trend() {
        let engine = engine();
        seed(&engine, "m", &[1.0]);
        let insights = engine.evaluate(&record(&[("m", 2.0)])).unwrap();
        assert!(insights.iter().all(|i| i.insight_type() != "trend"));
    }

    #[test]
    fn pattern_match_emitted_first() {
        let history = Arc::new(MetricHistory::new(100));
        let patterns = Arc::new(PatternRegistry::new());
        patterns.register(Pattern::new(
            "cpu_present",
            |r: &DataRecord| r.contains_key("cpu"),
            |_| 0.9,
        ));
        let engine = InsightEngine::new(
            history,
            patterns,
            Arc::new(ThresholdMap::new()),
            &BrokerConfig::default(),
        );
        seed(&engine, "cpu", &[1.0, 2.0, 3.0]);
        let insights = engine.evaluate(&record(&[("cpu", 4.0)])).unwrap();
        assert_eq!(insights[0].insight_type(), "pattern_match");
        assert_matches!(
            &insights[0],
            Insight::PatternMatch { name, confidence, .. } => {
                assert_eq!(name, "cpu_present");
                assert_eq!(*confidence, 0.9);
            }
        );
    }

    #[test]
    fn non_matching_pattern_silent() {
        let patterns = Arc::new(PatternRegistry::new());
        patterns.register(Pattern::new("never", |_: &DataRecord| false, |_| 1.0));
        let engine = InsightEngine::new(
            Arc::new(MetricHistory::new(10)),
            patterns,
            Arc::new(ThresholdMap::new()),
            &BrokerConfig::default(),
        );
        let insights = engine.evaluate(&record(&[("m", 1.0)])).unwrap();
        assert!(insights.is_empty());
    }

    #[test]
    fn non_numeric_value_fails_whole_call() {
        let engine = engine();
        seed(&engine, "good", &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut rec = record(&[("good", 100.0)]);
        let _ = rec.insert("bad".into(), json!("not a number"));
        let err = engine.evaluate(&rec).unwrap_err();
        assert_eq!(err.code(), VALIDATION_ERROR);
        // No partial appends happened.
        assert_eq!(engine.history.len("good"), 5);
        assert!(engine.history.is_empty("bad"));
    }

    #[test]
    fn metrics_processed_in_key_order() {
        let engine = engine();
        seed(&engine, "a", &[1.0, 2.0, 3.0]);
        seed(&engine, "b", &[9.0, 6.0, 3.0]);
        let insights = engine
            .evaluate(&record(&[("b", 1.0), ("a", 4.0)]))
            .unwrap();
        let trended: Vec<&str> = insights.iter().filter_map(Insight::metric).collect();
        // serde_json maps iterate in key order, so "a" comes before "b".
        assert_eq!(trended, vec!["a", "b"]);
    }

    #[test]
    fn custom_sigma_and_floor() {
        let config = BrokerConfig {
            anomaly_sigma: 1.0,
            trend_floor: 10.0,
            ..BrokerConfig::default()
        };
        let engine = engine_with(&config);
        seed(&engine, "m", &[1.0, 2.0, 3.0]);
        // mean 2, sigma ~0.816: 4.0 deviates by 2 > 1*sigma.
        let insights = engine.evaluate(&record(&[("m", 4.0)])).unwrap();
        assert!(insights.iter().any(|i| i.insight_type() == "anomaly"));
        // trend floor of 10 suppresses the slope of ~0.67.
        assert!(insights.iter().all(|i| i.insight_type() != "trend"));
    }
}
