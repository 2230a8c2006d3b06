//! toolgate: one tool catalogue over many backend servers.
//!
//! Backends are reached over stdio subprocesses, streaming HTTP, or a
//! direct HTTP bypass. Callers get a single list of function-calling
//! schemas and a single `call_tool` entry point, rate limited and bounded
//! by per-call deadlines.

pub mod gateway;
pub mod logging;

pub use gateway::{
    BackendConnector, CallResult, ContentPart, DiscoveryReport, FunctionSchema, GatewayConfig,
    GatewayError, GatewayOptions, GatewayState, InvocationFailure, ToolGateway,
};
