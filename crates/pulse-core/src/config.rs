//! Broker configuration.
//!
//! All fields have serde defaults so a partial (or empty) config document
//! deserializes to a working setup. `PULSE_`-prefixed environment variables
//! override individual fields after deserialization.

use serde::{Deserialize, Serialize};

fn default_history_capacity() -> usize {
    1000
}
fn default_anomaly_sigma() -> f64 {
    3.0
}
fn default_trend_floor() -> f64 {
    0.01
}
fn default_client_buffer() -> usize {
    64
}
fn default_max_client_drops() -> u64 {
    100
}
fn default_ingest_interval_secs() -> u64 {
    60
}

/// Runtime configuration for the insight broker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Rolling observations kept per metric.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Standard-deviation multiple a value must exceed to be anomalous.
    #[serde(default = "default_anomaly_sigma")]
    pub anomaly_sigma: f64,
    /// Minimum absolute slope for a trend insight to be emitted.
    #[serde(default = "default_trend_floor")]
    pub trend_floor: f64,
    /// Per-client outbound channel capacity (frames).
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,
    /// Lifetime dropped-frame budget before a slow client is disconnected.
    #[serde(default = "default_max_client_drops")]
    pub max_client_drops: u64,
    /// Interval between ingest polls, in seconds.
    #[serde(default = "default_ingest_interval_secs")]
    pub ingest_interval_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            anomaly_sigma: default_anomaly_sigma(),
            trend_floor: default_trend_floor(),
            client_buffer: default_client_buffer(),
            max_client_drops: default_max_client_drops(),
            ingest_interval_secs: default_ingest_interval_secs(),
        }
    }
}

impl BrokerConfig {
    /// Apply `PULSE_*` environment overrides to numeric fields.
    ///
    /// Unparseable values are ignored with a warning rather than failing
    /// startup.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
            let raw = std::env::var(key).ok()?;
            match raw.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(key, raw, "ignoring unparseable env override");
                    None
                }
            }
        }
        if let Some(v) = parse_env("PULSE_HISTORY_CAPACITY") {
            self.history_capacity = v;
        }
        if let Some(v) = parse_env("PULSE_ANOMALY_SIGMA") {
            self.anomaly_sigma = v;
        }
        if let Some(v) = parse_env("PULSE_TREND_FLOOR") {
            self.trend_floor = v;
        }
        if let Some(v) = parse_env("PULSE_CLIENT_BUFFER") {
            self.client_buffer = v;
        }
        if let Some(v) = parse_env("PULSE_MAX_CLIENT_DROPS") {
            self.max_client_drops = v;
        }
        if let Some(v) = parse_env("PULSE_INGEST_INTERVAL_SECS") {
            self.ingest_interval_secs = v;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults() {
        let cfg = BrokerConfig::default();
        assert_eq!(cfg.history_capacity, 1000);
        assert_eq!(cfg.anomaly_sigma, 3.0);
        assert_eq!(cfg.trend_floor, 0.01);
        assert_eq!(cfg.client_buffer, 64);
        assert_eq!(cfg.max_client_drops, 100);
        assert_eq!(cfg.ingest_interval_secs, 60);
    }

    #[test]
    fn empty_document_deserializes_to_defaults() {
        let cfg: BrokerConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(cfg, BrokerConfig::default());
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let cfg: BrokerConfig =
            serde_json::from_value(json!({"history_capacity": 50, "anomaly_sigma": 2.5})).unwrap();
        assert_eq!(cfg.history_capacity, 50);
        assert_eq!(cfg.anomaly_sigma, 2.5);
        assert_eq!(cfg.trend_floor, 0.01);
    }

    #[test]
    fn round_trip() {
        let cfg = BrokerConfig {
            history_capacity: 10,
            ..BrokerConfig::default()
        };
        let json = serde_json::to_value(&cfg).unwrap();
        let back: BrokerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, cfg);
    }
}
