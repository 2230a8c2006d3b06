//! Tool gateway.
//!
//! Aggregates the tools of heterogeneous backend servers into one catalogue
//! of function-calling schemas and dispatches calls to whichever backend
//! owns each tool.
//!
//! Architecture:
//! - `config`: parses the `mcpServers` JSON file into typed server configs
//! - `connector`: the `BackendConnector` trait and per-transport construction
//! - `stdio` / `streamable_http` / `direct_http`: the connector variants
//! - `protocol` / `transport` / `sse`: the JSON-RPC exchange and its framing
//! - `schema`: descriptor → `{"type": "function", ...}` translation
//! - `registry`: tool name → owning connector
//! - `rate_limit`: token bucket shared by all calls
//! - `client`: `ToolGateway`, the orchestrator callers use

pub mod client;
pub mod config;
pub mod connector;
pub mod content;
pub mod direct_http;
pub mod errors;
pub mod protocol;
pub mod rate_limit;
pub mod registry;
pub mod schema;
pub mod sse;
pub mod stdio;
pub mod streamable_http;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{DiscoveryReport, GatewayOptions, GatewayState, ToolGateway};
pub use config::{GatewayConfig, ServerConfig, TransportConfig, TransportKind};
pub use connector::BackendConnector;
pub use content::{CallResult, ContentPart};
pub use errors::{GatewayError, InvocationFailure};
pub use rate_limit::RateLimiter;
pub use schema::FunctionSchema;
pub use types::ToolDescriptor;
