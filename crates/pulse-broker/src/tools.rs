//! Tool handler registry and dispatch.
//!
//! Lookup → parameter validation → handler invocation, with each failure
//! mode mapped to the broker error taxonomy: unknown name is `NotFound`,
//! missing or mistyped parameters are `Validation` and never reach the
//! handler, and a handler failure comes back wrapped as `Handler`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use pulse_core::error::BrokerError;
use pulse_core::tool::{ParameterKind, ToolDefinition};
use pulse_engine::MetricHistory;

/// An external tool implementation.
///
/// Handlers must be safe for concurrent invocation or serialize internally;
/// the dispatcher never serializes calls on their behalf.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute with validated parameters.
    async fn call(&self, parameters: Map<String, Value>) -> anyhow::Result<Value>;
}

/// Plain functions work as handlers for synchronous tools.
#[async_trait]
impl<F> ToolHandler for F
where
    F: Fn(Map<String, Value>) -> anyhow::Result<Value> + Send + Sync,
{
    async fn call(&self, parameters: Map<String, Value>) -> anyhow::Result<Value> {
        self(parameters)
    }
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Registry of named tools.
///
/// Registration is last-write-wins and atomic with respect to dispatch: a
/// concurrent dispatch sees either the old or the new registration, never a
/// half-updated one. Dispatches of different (or the same) tool proceed
/// concurrently; the handler `Arc` is cloned out before any await.
#[derive(Default)]
pub struct ToolDispatcher {
    tools: RwLock<HashMap<String, Arc<RegisteredTool>>>,
}

impl ToolDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any prior definition of the same name.
    pub fn register(&self, definition: ToolDefinition, handler: Arc<dyn ToolHandler>) {
        let name = definition.name.clone();
        let _ = self
            .tools
            .write()
            .insert(name, Arc::new(RegisteredTool { definition, handler }));
    }

    /// Definitions of every registered tool, in name order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .read()
            .values()
            .map(|t| t.definition.clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Whether a tool is registered.
    #[must_use]
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Validate and invoke a tool by name.
    #[instrument(skip(self, parameters))]
    pub async fn dispatch(
        &self,
        name: &str,
        parameters: Map<String, Value>,
    ) -> Result<Value, BrokerError> {
        let Some(tool) = self.tools.read().get(name).cloned() else {
            counter!("pulse_tool_dispatch_total", "outcome" => "not_found").increment(1);
            return Err(BrokerError::not_found(format!("no such tool: {name}")));
        };

        validate_parameters(&tool.definition, &parameters)?;

        let result = tool.handler.call(parameters).await.map_err(|e| {
            counter!("pulse_tool_dispatch_total", "outcome" => "handler_error").increment(1);
            BrokerError::Handler { source: e }
        })?;
        counter!("pulse_tool_dispatch_total", "outcome" => "ok").increment(1);
        debug!("tool dispatched");
        Ok(result)
    }
}

/// Check required presence and declared kinds before the handler runs.
fn validate_parameters(
    definition: &ToolDefinition,
    parameters: &Map<String, Value>,
) -> Result<(), BrokerError> {
    for required in &definition.parameters.required {
        if !parameters.contains_key(required) {
            counter!("pulse_tool_dispatch_total", "outcome" => "invalid_params").increment(1);
            return Err(BrokerError::validation(format!(
                "missing required parameter: {required}"
            )));
        }
    }
    for (name, value) in parameters {
        if let Some(kind) = definition.parameters.properties.get(name) {
            if !kind.accepts(value) {
                counter!("pulse_tool_dispatch_total", "outcome" => "invalid_params").increment(1);
                return Err(BrokerError::validation(format!(
                    "parameter '{name}' has wrong type"
                )));
            }
        }
    }
    Ok(())
}

// ── Built-in tools ──────────────────────────────────────────────────

/// Register the broker's default tools, backed by the shared history.
pub fn register_builtin_tools(dispatcher: &ToolDispatcher, history: Arc<MetricHistory>) {
    let list_history = Arc::clone(&history);
    dispatcher.register(
        ToolDefinition::builder("list_metrics", "List all metrics with recorded history").build(),
        Arc::new(move |_params: Map<String, Value>| -> anyhow::Result<Value> {
            let mut metrics = list_history.metric_keys();
            metrics.sort();
            Ok(json!({ "metrics": metrics }))
        }),
    );

    dispatcher.register(
        ToolDefinition::builder("describe_metric", "Summarize one metric's rolling history")
            .required("metric", ParameterKind::String)
            .optional("window", ParameterKind::Number)
            .build(),
        Arc::new(move |params: Map<String, Value>| -> anyhow::Result<Value> {
            let metric = params
                .get("metric")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let mut values = history.snapshot(metric);
            if let Some(window) = params.get("window").and_then(Value::as_u64) {
                let window = window as usize;
                if values.len() > window {
                    let _ = values.drain(..values.len() - window);
                }
            }
            if values.is_empty() {
                return Ok(json!({ "metric": metric, "count": 0 }));
            }
            let count = values.len();
            let sum: f64 = values.iter().sum();
            let mean = sum / count as f64;
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            Ok(json!({
                "metric": metric,
                "count": count,
                "mean": mean,
                "min": min,
                "max": max,
                "latest": values[count - 1],
            }))
        }),
    );
}
