//! Client session management, topic broadcast, and tool dispatch.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-client outbound handle and the transport receive trait |
//! | `subscriptions` | Client registry and topic → subscriber sets |
//! | `broadcast` | Fan-out to one topic's subscribers or to all clients |
//! | `tools` | Tool handler registry, validation, and dispatch |
//! | `session` | Per-client lifecycle state machine and inbound routing |
//! | `ingest` | Source registry and the feed → evaluate → publish loop |
//!
//! ## Data flow
//!
//! Ingest feed → `InsightEngine::evaluate` → `broadcast` → subscribed
//! clients. Independently, each client's inbound frames flow through
//! `session` to `tools` (tool calls) or `subscriptions`
//! (subscribe/unsubscribe), with replies sent back on the same handle.

pub mod broadcast;
pub mod connection;
pub mod ingest;
pub mod session;
pub mod subscriptions;
pub mod tools;

pub use broadcast::BroadcastHub;
pub use connection::{ClientConnection, ClientId, TransportReceiver};
pub use ingest::{run_ingest_loop, run_poll_loop, IngestSample, SourceRegistry};
pub use session::{SessionCoordinator, SessionState};
pub use subscriptions::SubscriptionRegistry;
pub use tools::{register_builtin_tools, ToolDispatcher, ToolHandler};
