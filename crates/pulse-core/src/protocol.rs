//! Client-facing message types.
//!
//! Inbound frames are classified by their `kind` field. Unrecognized kinds
//! become an explicit [`ClientMessage::Unknown`] variant so the session can
//! report them without tearing down the connection; a recognized kind with a
//! malformed payload is a validation error instead.
//!
//! Outbound frames are an internally-tagged enum serialized once per
//! broadcast and shared between recipients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BrokerError, ErrorBody};
use crate::insight::Insight;
use crate::tool::ToolDefinition;

/// A message received from a connected client.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    /// Subscribe to one or more topics.
    Subscribe {
        /// Topics to add.
        topics: Vec<String>,
    },
    /// Unsubscribe from one or more topics.
    Unsubscribe {
        /// Topics to drop.
        topics: Vec<String>,
    },
    /// Invoke a registered tool.
    ToolCall {
        /// Caller-assigned correlation id, echoed on the reply.
        id: String,
        /// Registered tool name.
        tool: String,
        /// Named arguments.
        parameters: Map<String, Value>,
    },
    /// Ask for the definitions of all registered tools.
    ListTools,
    /// Any kind this broker does not understand.
    Unknown {
        /// The unrecognized kind string.
        kind: String,
    },
}

#[derive(Deserialize)]
struct TopicsPayload {
    #[serde(default)]
    topics: Vec<String>,
}

#[derive(Deserialize)]
struct ToolCallPayload {
    id: String,
    tool: String,
    #[serde(default)]
    parameters: Map<String, Value>,
}

impl ClientMessage {
    /// Classify a raw inbound frame.
    ///
    /// Returns `Validation` when the frame is not an object, has no string
    /// `kind`, or a recognized kind carries a malformed payload. Unrecognized
    /// kinds parse successfully into [`ClientMessage::Unknown`].
    pub fn parse(value: Value) -> Result<Self, BrokerError> {
        let Some(kind) = value.get("kind").and_then(Value::as_str) else {
            return Err(BrokerError::validation(
                "message must be an object with a string 'kind' field",
            ));
        };
        match kind {
            "subscribe" => {
                let payload: TopicsPayload = serde_json::from_value(value)
                    .map_err(|e| BrokerError::validation(format!("malformed subscribe: {e}")))?;
                Ok(Self::Subscribe {
                    topics: payload.topics,
                })
            }
            "unsubscribe" => {
                let payload: TopicsPayload = serde_json::from_value(value)
                    .map_err(|e| BrokerError::validation(format!("malformed unsubscribe: {e}")))?;
                Ok(Self::Unsubscribe {
                    topics: payload.topics,
                })
            }
            "tool_call" => {
                let payload: ToolCallPayload = serde_json::from_value(value)
                    .map_err(|e| BrokerError::validation(format!("malformed tool_call: {e}")))?;
                Ok(Self::ToolCall {
                    id: payload.id,
                    tool: payload.tool,
                    parameters: payload.parameters,
                })
            }
            "list_tools" => Ok(Self::ListTools),
            other => Ok(Self::Unknown { kind: other.into() }),
        }
    }
}

/// A message sent to a connected client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A derived insight, broadcast to topic subscribers.
    Insight {
        /// The insight payload.
        insight: Insight,
    },
    /// Successful tool-call reply, correlated by `id`.
    ToolResult {
        /// The caller's correlation id.
        id: String,
        /// Handler result.
        result: Value,
    },
    /// Reply to `list_tools`.
    ToolList {
        /// Definitions of every registered tool.
        tools: Vec<ToolDefinition>,
    },
    /// Structured error frame.
    Error {
        /// Correlation id, when the error answers a specific request.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Error code and message.
        error: ErrorBody,
    },
}

impl ServerMessage {
    /// Build an error frame from a broker error.
    #[must_use]
    pub fn error(id: Option<String>, err: &BrokerError) -> Self {
        Self::Error {
            id,
            error: err.to_error_body(),
        }
    }
}
