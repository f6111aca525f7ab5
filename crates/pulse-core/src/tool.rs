//! Tool definition types.
//!
//! A [`ToolDefinition`] describes a named, parameterized request a client may
//! dispatch: the tool's name, a short description, and a parameter schema
//! with declared kinds and a required list. Definitions are immutable once
//! registered; the dispatcher lives in the broker crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Declared kind of a tool parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// JSON string.
    String,
    /// JSON number (integer or float).
    Number,
    /// JSON boolean.
    Boolean,
    /// JSON object.
    Object,
    /// JSON array.
    Array,
}

impl ParameterKind {
    /// Whether `value` conforms to this kind.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// Parameter schema of a tool: declared kinds plus the required subset.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name → declared kind. Ordered for stable serialization.
    pub properties: BTreeMap<String, ParameterKind>,
    /// Names that must be present on every call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

/// A named tool exposed to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Parameter schema.
    pub parameters: ParameterSchema,
}

impl ToolDefinition {
    /// Start building a definition.
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
        ToolBuilder {
            name: name.into(),
            description: description.into(),
            schema: ParameterSchema::default(),
        }
    }
}

/// Fluent builder for [`ToolDefinition`].
///
/// ```ignore
/// ToolDefinition::builder("describe_metric", "Summarize one metric's history")
///     .required("metric", ParameterKind::String)
///     .optional("window", ParameterKind::Number)
///     .build()
/// ```
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: ParameterSchema,
}

impl ToolBuilder {
    /// Add a required parameter.
    #[must_use]
    pub fn required(mut self, name: &str, kind: ParameterKind) -> Self {
        let _ = self.schema.properties.insert(name.into(), kind);
        self.schema.required.push(name.into());
        self
    }

    /// Add an optional parameter.
    #[must_use]
    pub fn optional(mut self, name: &str, kind: ParameterKind) -> Self {
        let _ = self.schema.properties.insert(name.into(), kind);
        self
    }

    /// Finish the definition.
    #[must_use]
    pub fn build(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name,
            description: self.description,
            parameters: self.schema,
        }
    }
}
