//! Direct HTTP backend connector.
//!
//! For backends that accept bare JSON-RPC POSTs without a protocol
//! handshake. Each call is a single request; the result is parsed
//! leniently since such backends are often not fully protocol compliant.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use super::config::{HttpConfig, TransportKind};
use super::connector::{parse_headers, parse_url, BackendConnector};
use super::content::CallResult;
use super::errors::{GatewayError, RpcError};
use super::protocol;
use super::sse;
use super::streamable_http::{build_client, is_event_stream, truncate};
use super::types::{JsonRpcRequest, JsonRpcResponse, ToolDescriptor};

/// Error bodies are cut to this many bytes in messages.
const ERROR_BODY_LIMIT: usize = 512;

/// Reaches a backend with single, handshake-free JSON-RPC POSTs.
pub struct DirectHttpConnector {
    name: String,
    url: reqwest::Url,
    client: reqwest::Client,
    /// Served from config instead of asking the backend.
    static_tools: Vec<ToolDescriptor>,
}

impl DirectHttpConnector {
    pub fn new(name: &str, config: &HttpConfig) -> Result<Self, GatewayError> {
        let url = parse_url(name, &config.url)?;
        let headers = parse_headers(name, &config.headers)?;
        let client = build_client(name, config, headers)?;

        Ok(Self {
            name: name.to_string(),
            url,
            client,
            static_tools: config.tools.clone(),
        })
    }

    /// POST one request and return the decoded body.
    async fn post(
        &self,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, RpcError> {
        let request = JsonRpcRequest::new(1, method, Some(params));

        let response = self
            .client
            .post(self.url.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::transport(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Remote {
                code: i64::from(status.as_u16()),
                message: format!("HTTP {}: {}", status.as_u16(), truncate(&body, ERROR_BODY_LIMIT)),
                data: None,
            });
        }

        if is_event_stream(&response) {
            let rpc = sse::read_response(response.bytes_stream(), |_| true).await?;
            return rpc.into_result();
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RpcError::transport(format!("failed to read response body: {e}")))?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| RpcError::malformed(format!("response is not JSON: {e}")))?;

        unwrap_envelope(body)
    }

    async fn fetch_tools(&self, timeout: Duration) -> Result<Vec<ToolDescriptor>, RpcError> {
        let result = self
            .post("tools/list", serde_json::json!({}), timeout)
            .await?;
        Ok(protocol::parse_tool_page(result)?.tools)
    }
}

/// Pull `result` out of a JSON-RPC envelope, or pass a bare body through.
fn unwrap_envelope(body: serde_json::Value) -> Result<serde_json::Value, RpcError> {
    let is_envelope = body.get("result").is_some() || body.get("error").is_some();
    if !is_envelope {
        return Ok(body);
    }

    serde_json::from_value::<JsonRpcResponse>(body)
        .map_err(|e| RpcError::malformed(format!("invalid JSON-RPC envelope: {e}")))?
        .into_result()
}

#[async_trait]
impl BackendConnector for DirectHttpConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport_kind(&self) -> TransportKind {
        TransportKind::DirectHttp
    }

    async fn list_tools(&self, timeout: Duration) -> Result<Vec<ToolDescriptor>, GatewayError> {
        if !self.static_tools.is_empty() {
            tracing::debug!(
                server = %self.name,
                count = self.static_tools.len(),
                "using configured tool catalogue"
            );
            return Ok(self.static_tools.clone());
        }

        self.fetch_tools(timeout)
            .await
            .map_err(|e| e.into_discovery(&self.name))
    }

    async fn invoke(
        &self,
        tool: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<CallResult, GatewayError> {
        let params = serde_json::json!({
            "name": tool,
            "arguments": arguments,
        });

        let result = self
            .post("tools/call", params, timeout)
            .await
            .and_then(CallResult::from_loose_result);

        result.map_err(|e| {
            tracing::warn!(server = %self.name, tool, error = %e, "direct call failed");
            e.into_invocation(&self.name, tool)
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
