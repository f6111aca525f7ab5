//! Broker error taxonomy and wire-format error body.

use serde::{Deserialize, Serialize};

// ── Error code constants ────────────────────────────────────────────

/// Malformed data record or missing/invalid tool parameters.
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
/// Unknown tool, source, or metric.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Wrapped failure raised by an external tool handler.
pub const HANDLER_ERROR: &str = "HANDLER_ERROR";
/// Per-client send failure during broadcast.
pub const DELIVERY_ERROR: &str = "DELIVERY_ERROR";
/// Inbound message kind the session does not understand.
pub const UNSUPPORTED_MESSAGE: &str = "UNSUPPORTED_MESSAGE";

/// Error type shared across the engine and broker.
///
/// Dispatch-path variants (`Validation`, `NotFound`, `Handler`) are returned
/// to the originating client as a structured `error` frame and never crash
/// the coordinating task. `Delivery` is swallowed at the hub after the stale
/// client is removed. `UnsupportedMessage` is reported to the sender only.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Malformed data record or missing required tool parameter.
    #[error("{message}")]
    Validation {
        /// Description of what is wrong.
        message: String,
    },

    /// Requested tool, source, or metric does not exist.
    #[error("{message}")]
    NotFound {
        /// Human-readable message.
        message: String,
    },

    /// A registered tool handler failed.
    #[error("tool handler failed: {source}")]
    Handler {
        /// The handler's failure, kept opaque.
        #[from]
        source: anyhow::Error,
    },

    /// A send to a specific client failed (channel full or closed).
    #[error("delivery to client {client_id} failed")]
    Delivery {
        /// The client the send was addressed to.
        client_id: String,
    },

    /// Inbound message kind with no route.
    #[error("unsupported message kind: {kind}")]
    UnsupportedMessage {
        /// The unrecognized kind string.
        kind: String,
    },
}

impl BrokerError {
    /// Build a validation error from anything displayable.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Build a not-found error from anything displayable.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Machine-readable error code for this variant.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => VALIDATION_ERROR,
            Self::NotFound { .. } => NOT_FOUND,
            Self::Handler { .. } => HANDLER_ERROR,
            Self::Delivery { .. } => DELIVERY_ERROR,
            Self::UnsupportedMessage { .. } => UNSUPPORTED_MESSAGE,
        }
    }

    /// Convert to the wire-format error body.
    #[must_use]
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
        }
    }
}

/// Structured error payload sent to clients in `error` frames.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code (one of the constants in this module).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}
