//! The full-protocol exchange, shared by every transport that speaks it.
//!
//! A session is: `initialize` request, `notifications/initialized`
//! notification, then `tools/list` (paged) or `tools/call`.

use async_trait::async_trait;

use super::content::CallResult;
use super::errors::RpcError;
use super::types::{initialize_params, JsonRpcResponse, ListToolsResult, ToolDescriptor};

/// Upper bound on `tools/list` pages followed in one discovery.
const MAX_LIST_PAGES: usize = 64;

/// A JSON-RPC request/response channel to one backend.
#[async_trait]
pub trait RpcChannel: Send {
    /// Send a request and wait for the response with the same id.
    async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, RpcError>;

    /// Send a notification (no response expected).
    async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), RpcError>;
}

/// Run the initialization handshake.
pub async fn handshake<C: RpcChannel + ?Sized>(channel: &mut C) -> Result<(), RpcError> {
    let result = channel
        .request("initialize", Some(initialize_params()))
        .await?
        .into_result()?;

    if let Some(version) = result.get("protocolVersion").and_then(|v| v.as_str()) {
        tracing::debug!(protocol_version = version, "backend initialized");
    }

    channel.notify("notifications/initialized", None).await
}

/// Fetch every tool, following `nextCursor` pagination.
pub async fn list_tools<C: RpcChannel + ?Sized>(
    channel: &mut C,
) -> Result<Vec<ToolDescriptor>, RpcError> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;

    for _ in 0..MAX_LIST_PAGES {
        let params = cursor
            .as_ref()
            .map(|c| serde_json::json!({ "cursor": c }));
        let result = channel.request("tools/list", params).await?.into_result()?;
        let page = parse_tool_page(result)?;

        tools.extend(page.tools);
        match page.next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => return Ok(tools),
        }
    }

    tracing::warn!(pages = MAX_LIST_PAGES, "tools/list pagination limit reached");
    Ok(tools)
}

/// Invoke one tool and normalize its result.
pub async fn call_tool<C: RpcChannel + ?Sized>(
    channel: &mut C,
    tool: &str,
    arguments: serde_json::Value,
) -> Result<CallResult, RpcError> {
    let params = serde_json::json!({
        "name": tool,
        "arguments": arguments,
    });
    let result = channel
        .request("tools/call", Some(params))
        .await?
        .into_result()?;
    CallResult::from_tool_result(result)
}

/// Parse a `tools/list` result object.
pub fn parse_tool_page(result: serde_json::Value) -> Result<ListToolsResult, RpcError> {
    if result.get("tools").map(|t| !t.is_array()).unwrap_or(true) {
        return Err(RpcError::malformed("tools/list result has no 'tools' array"));
    }
    serde_json::from_value(result)
        .map_err(|e| RpcError::malformed(format!("failed to parse tools/list result: {e}")))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
