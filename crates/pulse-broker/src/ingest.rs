//! Data-source registry and the ingest → evaluate → publish loop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use pulse_core::error::BrokerError;
use pulse_core::ServerMessage;
use pulse_engine::{DataRecord, InsightEngine};

use crate::broadcast::BroadcastHub;

/// Topic every insight is published to, regardless of source.
pub const INSIGHTS_TOPIC: &str = "insights";

/// One reading from a named data source.
#[derive(Clone, Debug)]
pub struct IngestSample {
    /// Registered source name.
    pub source: String,
    /// Metric name → numeric value.
    pub record: DataRecord,
    /// When the source captured the reading (RFC 3339). Derived insights
    /// carry their own creation timestamps; this one is for traceability.
    pub timestamp: String,
}

impl IngestSample {
    /// Build a sample stamped with the current UTC time.
    #[must_use]
    pub fn new(source: impl Into<String>, record: DataRecord) -> Self {
        Self {
            source: source.into(),
            record,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Named data sources and the metrics each is allowed to report.
///
/// A source registered with an empty metric set accepts any metric name.
/// Re-registering a source replaces its declared set.
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, HashSet<String>>>,
}

impl SourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source with its declared metrics. An empty iterator means
    /// the source may report any metric.
    pub fn register<I, S>(&self, name: &str, metrics: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let declared: HashSet<String> = metrics.into_iter().map(Into::into).collect();
        let _ = self.sources.write().insert(name.to_owned(), declared);
        info!(source = name, "source registered");
    }

    /// Names of all registered sources, in name order.
    #[must_use]
    pub fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Check a sample against its source's declaration.
    ///
    /// Unknown sources are `NotFound`; a metric outside a non-empty declared
    /// set is `Validation`.
    pub fn validate(&self, sample: &IngestSample) -> Result<(), BrokerError> {
        let sources = self.sources.read();
        let Some(declared) = sources.get(&sample.source) else {
            return Err(BrokerError::not_found(format!(
                "no such source: {}",
                sample.source
            )));
        };
        if declared.is_empty() {
            return Ok(());
        }
        for metric in sample.record.keys() {
            if !declared.contains(metric) {
                return Err(BrokerError::validation(format!(
                    "source '{}' does not declare metric '{metric}'",
                    sample.source
                )));
            }
        }
        Ok(())
    }
}

/// Per-source topic name.
#[must_use]
pub fn source_topic(source: &str) -> String {
    format!("{INSIGHTS_TOPIC}:{source}")
}

/// Validate, evaluate, and publish one sample. Bad samples (unknown source,
/// undeclared or non-numeric metric) are logged and dropped.
async fn process_sample(
    sample: IngestSample,
    engine: &InsightEngine,
    hub: &BroadcastHub,
    sources: &SourceRegistry,
) {
    if let Err(e) = sources.validate(&sample) {
        counter!("pulse_ingest_rejected_total").increment(1);
        error!(
            source = %sample.source,
            timestamp = %sample.timestamp,
            error = %e,
            "rejected sample"
        );
        return;
    }
    let insights = match engine.evaluate(&sample.record) {
        Ok(insights) => insights,
        Err(e) => {
            counter!("pulse_ingest_rejected_total").increment(1);
            error!(source = %sample.source, error = %e, "failed to evaluate sample");
            return;
        }
    };
    counter!("pulse_ingest_samples_total").increment(1);
    if insights.is_empty() {
        return;
    }
    let topic = source_topic(&sample.source);
    for insight in insights {
        let message = ServerMessage::Insight { insight };
        let _ = hub.publish(&message, Some(INSIGHTS_TOPIC)).await;
        let _ = hub.publish(&message, Some(&topic)).await;
    }
    debug!(source = %sample.source, "published sample insights");
}

/// Pull samples off the feed, evaluate each, and publish the resulting
/// insights to the shared topic and the sample's per-source topic.
///
/// A bad sample never terminates the loop; it only ends when the feed
/// closes.
pub async fn run_ingest_loop(
    mut feed: mpsc::Receiver<IngestSample>,
    engine: Arc<InsightEngine>,
    hub: Arc<BroadcastHub>,
    sources: Arc<SourceRegistry>,
) {
    while let Some(sample) = feed.recv().await {
        process_sample(sample, &engine, &hub, &sources).await;
    }
    info!("ingest feed closed");
}

/// Poll a pull-based source on a fixed interval until cancelled.
///
/// Each tick asks `poll` for the next sample; a `None` tick is idle, not
/// termination. The interval normally comes from
/// `BrokerConfig::ingest_interval_secs`.
pub async fn run_poll_loop<F>(
    mut poll: F,
    interval: Duration,
    engine: Arc<InsightEngine>,
    hub: Arc<BroadcastHub>,
    sources: Arc<SourceRegistry>,
    cancel: CancellationToken,
) where
    F: FnMut() -> Option<IngestSample> + Send,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Some(sample) = poll() {
                    process_sample(sample, &engine, &hub, &sources).await;
                }
            }
        }
    }
    info!("ingest polling stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{new_client_id, ClientConnection};
    use crate::subscriptions::SubscriptionRegistry;
    use pulse_core::error::{NOT_FOUND, VALIDATION_ERROR};
    use pulse_core::BrokerConfig;
    use pulse_engine::{MetricHistory, PatternRegistry, ThresholdMap};
    use serde_json::{json, Value};

    fn sample(source: &str, pairs: &[(&str, f64)]) -> IngestSample {
        IngestSample::new(
            source,
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), json!(v)))
                .collect(),
        )
    }

    fn engine() -> Arc<InsightEngine> {
        let config = BrokerConfig::default();
        Arc::new(InsightEngine::new(
            Arc::new(MetricHistory::new(config.history_capacity)),
            Arc::new(PatternRegistry::new()),
            Arc::new(ThresholdMap::new()),
            &config,
        ))
    }

    #[test]
    fn unknown_source_is_not_found() {
        let sources = SourceRegistry::new();
        let err = sources.validate(&sample("ghost", &[("cpu", 1.0)])).unwrap_err();
        assert_eq!(err.code(), NOT_FOUND);
    }

    #[test]
    fn undeclared_metric_is_validation() {
        let sources = SourceRegistry::new();
        sources.register("host", ["cpu", "mem"]);
        let err = sources.validate(&sample("host", &[("disk", 1.0)])).unwrap_err();
        assert_eq!(err.code(), VALIDATION_ERROR);
    }

    #[test]
    fn declared_metrics_pass() {
        let sources = SourceRegistry::new();
        sources.register("host", ["cpu", "mem"]);
        assert!(sources
            .validate(&sample("host", &[("cpu", 1.0), ("mem", 2.0)]))
            .is_ok());
    }

    #[test]
    fn empty_declaration_accepts_all() {
        let sources = SourceRegistry::new();
        sources.register("firehose", Vec::<String>::new());
        assert!(sources.validate(&sample("firehose", &[("anything", 1.0)])).is_ok());
    }

    #[test]
    fn reregister_replaces_declaration() {
        let sources = SourceRegistry::new();
        sources.register("host", ["cpu"]);
        sources.register("host", ["mem"]);
        assert!(sources.validate(&sample("host", &[("cpu", 1.0)])).is_err());
        assert!(sources.validate(&sample("host", &[("mem", 1.0)])).is_ok());
    }

    #[test]
    fn source_names_sorted() {
        let sources = SourceRegistry::new();
        sources.register("zeta", Vec::<String>::new());
        sources.register("alpha", Vec::<String>::new());
        assert_eq!(sources.source_names(), vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn loop_publishes_insights_to_both_topics() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let hub = Arc::new(BroadcastHub::new(Arc::clone(&registry)));
        let sources = Arc::new(SourceRegistry::new());
        sources.register("host", Vec::<String>::new());
        let engine = engine();

        let (shared_tx, mut shared_rx) = tokio::sync::mpsc::channel(16);
        let shared = Arc::new(ClientConnection::new(new_client_id(), shared_tx));
        let shared_id = shared.id.clone();
        registry.register(shared).await;
        registry.subscribe(&shared_id, INSIGHTS_TOPIC).await;

        let (scoped_tx, mut scoped_rx) = tokio::sync::mpsc::channel(16);
        let scoped = Arc::new(ClientConnection::new(new_client_id(), scoped_tx));
        let scoped_id = scoped.id.clone();
        registry.register(scoped).await;
        registry.subscribe(&scoped_id, &source_topic("host")).await;

        let (feed_tx, feed_rx) = mpsc::channel(16);
        // Quiet baseline then a spike: the last sample is a 3-sigma anomaly.
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            feed_tx.send(sample("host", &[("cpu", v)])).await.unwrap();
        }
        feed_tx.send(sample("host", &[("cpu", 100.0)])).await.unwrap();
        drop(feed_tx);

        run_ingest_loop(feed_rx, engine, hub, sources).await;

        let mut shared_frames = Vec::new();
        while let Ok(frame) = shared_rx.try_recv() {
            let parsed: Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(parsed["kind"], "insight");
            shared_frames.push(parsed);
        }
        // The ramp produces trend insights along the way and the spike at the
        // end produces an anomaly.
        assert!(shared_frames
            .iter()
            .any(|f| f["insight"]["type"] == "anomaly" && f["insight"]["metric"] == "cpu"));
        assert!(shared_frames.iter().any(|f| f["insight"]["type"] == "trend"));

        let mut scoped_count = 0;
        while scoped_rx.try_recv().is_ok() {
            scoped_count += 1;
        }
        assert_eq!(scoped_count, shared_frames.len());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_loop_samples_on_interval() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let hub = Arc::new(BroadcastHub::new(Arc::clone(&registry)));
        let sources = Arc::new(SourceRegistry::new());
        sources.register("poller", Vec::<String>::new());
        let engine = engine();
        let history = Arc::clone(engine.history());
        let cancel = CancellationToken::new();

        let mut reading = 0.0;
        let poll = move || {
            reading += 1.0;
            Some(IngestSample::new(
                "poller",
                [("cpu".to_owned(), json!(reading))].into_iter().collect(),
            ))
        };
        let task = tokio::spawn(run_poll_loop(
            poll,
            Duration::from_secs(60),
            engine,
            hub,
            sources,
            cancel.clone(),
        ));

        // The first tick fires immediately, then one per interval.
        tokio::time::sleep(Duration::from_secs(185)).await;
        cancel.cancel();
        task.await.unwrap();
        assert_eq!(history.len("cpu"), 4);
        assert_eq!(history.snapshot("cpu"), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn loop_skips_bad_samples_and_continues() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let hub = Arc::new(BroadcastHub::new(Arc::clone(&registry)));
        let sources = Arc::new(SourceRegistry::new());
        sources.register("host", ["cpu"]);
        let engine = engine();
        let history = Arc::clone(engine.history());

        let (feed_tx, feed_rx) = mpsc::channel(16);
        feed_tx.send(sample("ghost", &[("cpu", 1.0)])).await.unwrap();
        feed_tx.send(sample("host", &[("disk", 1.0)])).await.unwrap();
        feed_tx
            .send(IngestSample::new(
                "host",
                [("cpu".to_owned(), json!("not a number"))]
                    .into_iter()
                    .collect(),
            ))
            .await
            .unwrap();
        feed_tx.send(sample("host", &[("cpu", 1.0)])).await.unwrap();
        drop(feed_tx);

        run_ingest_loop(feed_rx, engine, hub, sources).await;
        // Only the final valid sample reached history.
        assert_eq!(history.len("cpu"), 1);
    }
}
