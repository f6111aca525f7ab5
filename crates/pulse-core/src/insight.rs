//! Derived insight types.
//!
//! An [`Insight`] is a transient observation derived from metric history:
//! an anomaly (value far outside the historical distribution), a trend
//! (sustained directional drift), or a pattern match (a registered predicate
//! fired on a data record). Insights are immutable once produced and are
//! broadcast to subscribed clients; the broker never persists them.

use serde::{Deserialize, Serialize};

/// Common fields carried by every insight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsightBase {
    /// ISO 8601 creation timestamp.
    pub timestamp: String,
}

impl InsightBase {
    /// Create a base stamped with the current UTC time.
    #[must_use]
    pub fn now() -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Direction of a detected trend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Positive slope.
    Up,
    /// Negative (or flat) slope.
    Down,
}

/// A derived observation about metric data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Insight {
    /// New value deviates more than the configured sigma multiple from the
    /// historical mean.
    Anomaly {
        /// Base fields.
        #[serde(flatten)]
        base: InsightBase,
        /// Metric the anomalous value arrived on.
        metric: String,
        /// The anomalous value itself.
        value: f64,
        /// Externally configured threshold for this metric (0 if unset).
        /// Carried for caller context; the statistical decision does not
        /// depend on it.
        threshold: f64,
    },

    /// Sustained directional drift over the metric's history window.
    Trend {
        /// Base fields.
        #[serde(flatten)]
        base: InsightBase,
        /// Metric the trend was computed over.
        metric: String,
        /// Up or down.
        direction: TrendDirection,
        /// Absolute slope of the window.
        magnitude: f64,
    },

    /// A registered pattern's predicate matched the data record.
    PatternMatch {
        /// Base fields.
        #[serde(flatten)]
        base: InsightBase,
        /// Name the pattern was registered under.
        name: String,
        /// Confidence in [0.0, 1.0] from the pattern's confidence function.
        confidence: f64,
    },
}

impl Insight {
    /// Get the base fields.
    #[must_use]
    pub fn base(&self) -> &InsightBase {
        match self {
            Self::Anomaly { base, .. }
            | Self::Trend { base, .. }
            | Self::PatternMatch { base, .. } => base,
        }
    }

    /// Type-discrimination string, matching the serialized `type` tag.
    #[must_use]
    pub fn insight_type(&self) -> &'static str {
        match self {
            Self::Anomaly { .. } => "anomaly",
            Self::Trend { .. } => "trend",
            Self::PatternMatch { .. } => "pattern_match",
        }
    }

    /// Metric this insight concerns, if it concerns a single one.
    #[must_use]
    pub fn metric(&self) -> Option<&str> {
        match self {
            Self::Anomaly { metric, .. } | Self::Trend { metric, .. } => Some(metric),
            Self::PatternMatch { .. } => None,
        }
    }
}
