//! Foundation crate for the Pulse insight broker.
//!
//! Everything here is shared by the engine and broker crates:
//!
//! - [`error`] — the broker-wide error taxonomy and its wire form.
//! - [`protocol`] — inbound/outbound client message types.
//! - [`insight`] — derived insight variants (anomaly, trend, pattern match).
//! - [`tool`] — tool definitions and parameter schemas.
//! - [`config`] — runtime configuration with serde defaults.
//! - [`telemetry`] — tracing bootstrap.

pub mod config;
pub mod error;
pub mod insight;
pub mod protocol;
pub mod telemetry;
pub mod tool;

pub use config::BrokerConfig;
pub use error::{BrokerError, ErrorBody};
pub use insight::{Insight, InsightBase, TrendDirection};
pub use protocol::{ClientMessage, ServerMessage};
pub use tool::{ParameterKind, ParameterSchema, ToolDefinition};
