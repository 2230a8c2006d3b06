//! Streaming HTTP backend connector.
//!
//! Every JSON-RPC message is POSTed to the configured endpoint. The server
//! answers with either a JSON body or a `text/event-stream` carrying the
//! response among other messages. A session id handed out during
//! `initialize` is echoed on every later request and released with a
//! DELETE when the session ends.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};

use super::config::{HttpConfig, TransportKind};
use super::connector::{parse_headers, parse_url, BackendConnector};
use super::content::CallResult;
use super::errors::{GatewayError, RpcError};
use super::protocol::{self, RpcChannel};
use super::sse;
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ToolDescriptor};

/// Session header assigned by the server.
pub const SESSION_HEADER: &str = "mcp-session-id";

const ACCEPT_VALUE: &str = "application/json, text/event-stream";

/// Error bodies are cut to this many bytes in messages.
const ERROR_BODY_LIMIT: usize = 512;

/// Reaches a backend over the streaming HTTP transport.
pub struct StreamingHttpConnector {
    name: String,
    url: reqwest::Url,
    client: reqwest::Client,
}

impl StreamingHttpConnector {
    pub fn new(name: &str, config: &HttpConfig) -> Result<Self, GatewayError> {
        let url = parse_url(name, &config.url)?;
        let headers = parse_headers(name, &config.headers)?;
        let client = build_client(name, config, headers)?;

        Ok(Self {
            name: name.to_string(),
            url,
            client,
        })
    }

    async fn discover(&self) -> Result<Vec<ToolDescriptor>, RpcError> {
        let mut session = HttpSession::new(self);
        let outcome = async {
            protocol::handshake(&mut session).await?;
            protocol::list_tools(&mut session).await
        }
        .await;
        session.close().await;
        outcome
    }

    async fn call(&self, tool: &str, arguments: serde_json::Value) -> Result<CallResult, RpcError> {
        let mut session = HttpSession::new(self);
        let outcome = async {
            protocol::handshake(&mut session).await?;
            protocol::call_tool(&mut session, tool, arguments).await
        }
        .await;
        session.close().await;
        outcome
    }
}

/// Client with the configured timeouts and default headers.
pub(crate) fn build_client(
    name: &str,
    config: &HttpConfig,
    headers: HeaderMap,
) -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.stream_timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| GatewayError::ConnectorFailed {
            server: name.to_string(),
            reason: format!("failed to build http client: {e}"),
        })
}

#[async_trait]
impl BackendConnector for StreamingHttpConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport_kind(&self) -> TransportKind {
        TransportKind::StreamingHttp
    }

    async fn list_tools(&self, timeout: Duration) -> Result<Vec<ToolDescriptor>, GatewayError> {
        match tokio::time::timeout(timeout, self.discover()).await {
            Ok(result) => result.map_err(|e| e.into_discovery(&self.name)),
            Err(_) => Err(GatewayError::DiscoveryError {
                server: self.name.clone(),
                reason: format!("timed out after {}ms", timeout.as_millis()),
            }),
        }
    }

    async fn invoke(
        &self,
        tool: &str,
        arguments: serde_json::Value,
        _timeout: Duration,
    ) -> Result<CallResult, GatewayError> {
        self.call(tool, arguments)
            .await
            .map_err(|e| e.into_invocation(&self.name, tool))
    }
}

// ─── Session ─────────────────────────────────────────────────────────────────

struct HttpSession<'a> {
    connector: &'a StreamingHttpConnector,
    session_id: Option<String>,
    next_id: u64,
}

impl<'a> HttpSession<'a> {
    fn new(connector: &'a StreamingHttpConnector) -> Self {
        Self {
            connector,
            session_id: None,
            next_id: 1,
        }
    }

    async fn post(&mut self, body: String) -> Result<reqwest::Response, RpcError> {
        let mut request = self
            .connector
            .client
            .post(self.connector.url.clone())
            .header(ACCEPT, ACCEPT_VALUE)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(id) = &self.session_id {
            request = request.header(SESSION_HEADER, id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RpcError::transport(format!("request failed: {e}")))?;

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if self.session_id.as_deref() != Some(id) {
                tracing::debug!(server = %self.connector.name, session = id, "session assigned");
                self.session_id = Some(id.to_string());
            }
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::transport(format!(
                "server responded with status={} body={}",
                status.as_u16(),
                truncate(&body, ERROR_BODY_LIMIT)
            )));
        }
        Ok(response)
    }

    /// Release the server-side session; failures are ignored.
    async fn close(self) {
        let Some(id) = self.session_id else {
            return;
        };

        let result = self
            .connector
            .client
            .delete(self.connector.url.clone())
            .header(SESSION_HEADER, &id)
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!(server = %self.connector.name, error = %e, "session close failed");
        }
    }
}

#[async_trait]
impl RpcChannel for HttpSession<'_> {
    async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, RpcError> {
        let id = self.next_id;
        self.next_id += 1;

        let body = serde_json::to_string(&JsonRpcRequest::new(id, method, params))
            .map_err(|e| RpcError::transport(format!("failed to serialize request: {e}")))?;
        let response = self.post(body).await?;

        if is_event_stream(&response) {
            return sse::read_response(response.bytes_stream(), |r| r.answers(id)).await;
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RpcError::transport(format!("failed to read response body: {e}")))?;
        let parsed: JsonRpcResponse = serde_json::from_slice(&bytes)
            .map_err(|e| RpcError::malformed(format!("response is not JSON-RPC: {e}")))?;
        if !parsed.answers(id) {
            return Err(RpcError::malformed(format!(
                "response id does not match request id {id}"
            )));
        }
        Ok(parsed)
    }

    async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), RpcError> {
        let body = serde_json::to_string(&JsonRpcNotification::new(method, params)).map_err(
            |e| RpcError::transport(format!("failed to serialize notification: {e}")),
        )?;
        self.post(body).await.map(|_| ())
    }
}

pub(crate) fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/event-stream"))
        .unwrap_or(false)
}

pub(crate) fn truncate(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ─── Tests ───────────────────────────────────────────────────────────────────
