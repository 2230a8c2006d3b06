//! The backend connector abstraction.
//!
//! One trait, one implementation per transport. The variant is chosen once,
//! when the connector is built from its `ServerConfig`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::config::{ServerConfig, TransportConfig, TransportKind};
use super::content::CallResult;
use super::direct_http::DirectHttpConnector;
use super::errors::GatewayError;
use super::stdio::StdioConnector;
use super::streamable_http::StreamingHttpConnector;
use super::types::ToolDescriptor;

/// A session-capable handle to one backend server.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// The configured server name.
    fn name(&self) -> &str;

    fn transport_kind(&self) -> TransportKind;

    /// List the backend's tools.
    ///
    /// Fails with `GatewayError::DiscoveryError`.
    async fn list_tools(&self, timeout: Duration) -> Result<Vec<ToolDescriptor>, GatewayError>;

    /// Invoke `tool` with `arguments`.
    ///
    /// Fails with `GatewayError::InvocationError`. The caller enforces the
    /// hard deadline; `timeout` is a hint for transports with their own
    /// request timeouts.
    async fn invoke(
        &self,
        tool: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<CallResult, GatewayError>;
}

impl std::fmt::Debug for dyn BackendConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConnector")
            .field("name", &self.name())
            .field("transport", &self.transport_kind())
            .finish()
    }
}

/// Build the connector for `config`.
pub fn build_connector(config: &ServerConfig) -> Result<Arc<dyn BackendConnector>, GatewayError> {
    let connector: Arc<dyn BackendConnector> = match &config.transport {
        TransportConfig::Stdio(stdio) => Arc::new(StdioConnector::new(&config.name, stdio.clone())),
        TransportConfig::StreamingHttp(http) => {
            Arc::new(StreamingHttpConnector::new(&config.name, http)?)
        }
        TransportConfig::DirectHttp(http) => Arc::new(DirectHttpConnector::new(&config.name, http)?),
    };

    tracing::debug!(
        server = %config.name,
        transport = %config.kind(),
        "built backend connector"
    );
    Ok(connector)
}

/// Shared by the HTTP variants.
pub(crate) fn parse_url(server: &str, url: &str) -> Result<reqwest::Url, GatewayError> {
    let parsed = reqwest::Url::parse(url.trim()).map_err(|e| GatewayError::ConnectorFailed {
        server: server.to_string(),
        reason: format!("invalid url '{url}': {e}"),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(GatewayError::ConnectorFailed {
            server: server.to_string(),
            reason: format!("unsupported url scheme '{other}'"),
        }),
    }
}

/// Shared by the HTTP variants.
pub(crate) fn parse_headers(
    server: &str,
    headers: &std::collections::HashMap<String, String>,
) -> Result<reqwest::header::HeaderMap, GatewayError> {
    let mut out = reqwest::header::HeaderMap::new();
    for (name, value) in headers {
        let header_name = reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            GatewayError::ConnectorFailed {
                server: server.to_string(),
                reason: format!("invalid header name '{name}'"),
            }
        })?;
        let header_value = reqwest::header::HeaderValue::from_str(value).map_err(|_| {
            GatewayError::ConnectorFailed {
                server: server.to_string(),
                reason: format!("invalid value for header '{name}'"),
            }
        })?;
        out.insert(header_name, header_value);
    }
    Ok(out)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
