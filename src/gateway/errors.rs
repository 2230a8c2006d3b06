//! Gateway error types.
//!
//! `GatewayError` is what callers of the gateway see. `RpcError` is the
//! lower-level failure produced while talking JSON-RPC to one backend; each
//! connector maps it onto a `DiscoveryError` or an `InvocationError`.

use thiserror::Error;

/// Why a tool invocation failed on the backend side.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvocationFailure {
    /// The backend could not be reached (spawn failure, closed pipe, refused
    /// connection, session rejected).
    #[error("backend not connected: {detail}")]
    NotConnected { detail: String },

    /// The backend answered with an error.
    #[error("remote error [{code}]: {message}")]
    RemoteError { code: i64, message: String },

    /// The backend answered, but not with anything we can interpret.
    #[error("malformed response: {detail}")]
    MalformedResponse { detail: String },
}

/// Errors surfaced by the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or malformed configuration.
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    /// A connector could not be constructed from its configuration.
    #[error("failed to construct connector for '{server}': {reason}")]
    ConnectorFailed { server: String, reason: String },

    /// Listing tools from one backend failed.
    #[error("discovery failed for server '{server}': {reason}")]
    DiscoveryError { server: String, reason: String },

    /// Two backends expose a tool with the same name.
    #[error("tool '{name}' from server '{incoming}' conflicts with server '{existing}'")]
    DuplicateToolName {
        name: String,
        existing: String,
        incoming: String,
    },

    /// Tool name is not in the registry.
    #[error("unknown tool: '{name}'")]
    ToolNotFound { name: String },

    /// Tool call arguments are not a JSON object.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The call exceeded its deadline.
    #[error("tool call '{tool}' timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },

    /// The backend failed to run the tool.
    #[error("tool call '{tool}' on server '{server}' failed: {reason}")]
    InvocationError {
        server: String,
        tool: String,
        reason: InvocationFailure,
    },

    /// `call_tool` or `fetch_tool_schemas` before `initialize`.
    #[error("gateway is not initialized")]
    NotInitialized,
}

impl GatewayError {
    /// The invocation failure reason, if this is an `InvocationError`.
    pub fn invocation_reason(&self) -> Option<&InvocationFailure> {
        match self {
            GatewayError::InvocationError { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Failures while exchanging JSON-RPC messages with a single backend.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O, spawn, or HTTP-level failure.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// The backend returned a JSON-RPC error object (or a tool error).
    #[error("server error [{code}]: {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The backend returned something that is not a usable response.
    #[error("malformed response: {reason}")]
    Malformed { reason: String },
}

impl RpcError {
    pub(crate) fn transport(reason: impl Into<String>) -> Self {
        RpcError::Transport {
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        RpcError::Malformed {
            reason: reason.into(),
        }
    }

    /// Wrap as a discovery failure for `server`.
    pub fn into_discovery(self, server: &str) -> GatewayError {
        GatewayError::DiscoveryError {
            server: server.to_string(),
            reason: self.to_string(),
        }
    }

    /// Wrap as an invocation failure for `tool` on `server`.
    pub fn into_invocation(self, server: &str, tool: &str) -> GatewayError {
        GatewayError::InvocationError {
            server: server.to_string(),
            tool: tool.to_string(),
            reason: self.into(),
        }
    }
}

impl From<RpcError> for InvocationFailure {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Transport { reason } => InvocationFailure::NotConnected { detail: reason },
            RpcError::Remote { code, message, .. } => {
                InvocationFailure::RemoteError { code, message }
            }
            RpcError::Malformed { reason } => {
                InvocationFailure::MalformedResponse { detail: reason }
            }
        }
    }
}
