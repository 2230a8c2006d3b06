//! Shared types for the gateway.
//!
//! JSON-RPC 2.0 message types and the tool descriptor shape backends report.

use serde::{Deserialize, Serialize};

use super::errors::RpcError;

/// Protocol revision announced in the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
///
/// `id` is kept as a raw value: backends echo numbers, strings, or `null`.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    /// `Some(Value::Null)` when the backend sent `"result": null`.
    #[serde(default, deserialize_with = "present")]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// Keeps an explicit `null` distinct from an absent field.
fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl JsonRpcResponse {
    /// Whether this response answers request `id`.
    pub fn answers(&self, id: u64) -> bool {
        match &self.id {
            Some(serde_json::Value::Number(n)) => n.as_u64() == Some(id),
            Some(serde_json::Value::String(s)) => s.parse::<u64>().ok() == Some(id),
            _ => false,
        }
    }

    /// Whether this is a response at all, as opposed to a request or
    /// notification sent by the server.
    pub fn is_response(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    /// Extract the result, converting a JSON-RPC error into `RpcError`.
    pub fn into_result(self) -> Result<serde_json::Value, RpcError> {
        if let Some(err) = self.error {
            return Err(RpcError::Remote {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }

        self.result
            .ok_or_else(|| RpcError::malformed("response missing both result and error"))
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

// ─── Tool Descriptors ────────────────────────────────────────────────────────

/// A tool as reported by a backend's `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema", alias = "input_schema")]
    pub input_schema: serde_json::Value,
}

/// Paged `tools/list` result.
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default, rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// Parameters for the `initialize` handshake request.
pub fn initialize_params() -> serde_json::Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

// ─── Standard Error Codes ────────────────────────────────────────────────────

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// The tool ran and reported failure (`isError: true`).
    pub const TOOL_ERROR: i64 = -32000;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_notification_has_no_id() {
        let note = JsonRpcNotification::new("notifications/initialized", None);
        let json = serde_json::to_value(&note).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["method"], "notifications/initialized");
    }

    #[test]
    fn test_response_answers_numeric_and_string_ids() {
        let numeric: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":7,"result":{}}"#).unwrap();
        assert!(numeric.answers(7));
        assert!(!numeric.answers(8));

        let string: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"7","result":{}}"#).unwrap();
        assert!(string.answers(7));
    }

    #[test]
    fn test_server_request_is_not_a_response() {
        let msg: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        assert!(!msg.is_response());
    }

    #[test]
    fn test_null_result_is_a_response() {
        let resp: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"result":null}"#).unwrap();
        assert!(resp.is_response());
        assert!(resp.answers(3));
        assert_eq!(resp.into_result().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn test_into_result_error() {
        let resp: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        match resp.into_result().unwrap_err() {
            RpcError::Remote { code, message, .. } => {
                assert_eq!(code, error_codes::METHOD_NOT_FOUND);
                assert_eq!(message, "Method not found");
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[test]
    fn test_into_result_missing_both() {
        let resp: JsonRpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":2}"#).unwrap();
        assert!(matches!(
            resp.into_result().unwrap_err(),
            RpcError::Malformed { .. }
        ));
    }

    #[test]
    fn test_tool_descriptor_defaults() {
        let tool: ToolDescriptor = serde_json::from_str(r#"{"name": "add"}"#).unwrap();
        assert_eq!(tool.description, "");
        assert!(tool.input_schema.is_null());
    }

    #[test]
    fn test_tool_descriptor_reads_input_schema() {
        let tool: ToolDescriptor = serde_json::from_str(
            r#"{"name":"add","description":"Add","inputSchema":{"type":"object"}}"#,
        )
        .unwrap();
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_list_tools_cursor() {
        let page: ListToolsResult =
            serde_json::from_str(r#"{"tools":[{"name":"a"}],"nextCursor":"p2"}"#).unwrap();
        assert_eq!(page.tools.len(), 1);
        assert_eq!(page.next_cursor.as_deref(), Some("p2"));
    }
}
