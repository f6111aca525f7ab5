//! Insight derivation for the Pulse broker.
//!
//! - [`history`] — bounded rolling store of observations per metric.
//! - [`pattern`] — registered patterns and per-metric thresholds.
//! - [`engine`] — anomaly/trend/pattern evaluation over shared history.

pub mod engine;
pub mod history;
pub mod pattern;

pub use engine::{DataRecord, InsightEngine};
pub use history::MetricHistory;
pub use pattern::{Pattern, PatternRegistry, ThresholdMap};
