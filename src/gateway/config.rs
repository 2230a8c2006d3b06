//! Backend server configuration loading.
//!
//! Reads the `mcpServers` JSON document and resolves environment variables.
//! Each entry selects its transport by shape: `command` means a stdio
//! subprocess, `url` means streaming HTTP, and `url` with
//! `"transport": "direct"` means the direct HTTP bypass.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::errors::GatewayError;
use super::types::ToolDescriptor;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default HTTP connect timeout (`timeout`).
const DEFAULT_CONNECT_TIMEOUT_SECS: f64 = 30.0;

/// Default HTTP stream read timeout (`sse_read_timeout`).
const DEFAULT_STREAM_TIMEOUT_SECS: f64 = 300.0;

// ─── Public Types ────────────────────────────────────────────────────────────

/// Which transport a server is reached over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    StreamingHttp,
    DirectHttp,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportKind::Stdio => "stdio",
            TransportKind::StreamingHttp => "streaming_http",
            TransportKind::DirectHttp => "direct_http",
        };
        f.write_str(s)
    }
}

/// Launch parameters for a stdio backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StdioConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<String>,
}

/// Connection parameters for an HTTP backend.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub connect_timeout: Duration,
    pub stream_timeout: Duration,
    /// Static catalogue for direct backends that cannot list their tools.
    pub tools: Vec<ToolDescriptor>,
}

/// Transport-specific configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportConfig {
    Stdio(StdioConfig),
    StreamingHttp(HttpConfig),
    DirectHttp(HttpConfig),
}

/// One configured backend server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub name: String,
    pub transport: TransportConfig,
}

impl ServerConfig {
    pub fn kind(&self) -> TransportKind {
        match self.transport {
            TransportConfig::Stdio(_) => TransportKind::Stdio,
            TransportConfig::StreamingHttp(_) => TransportKind::StreamingHttp,
            TransportConfig::DirectHttp(_) => TransportKind::DirectHttp,
        }
    }
}

/// The parsed configuration file.
///
/// Servers are kept in name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayConfig {
    pub servers: Vec<ServerConfig>,
}

// ─── Raw File Format ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(rename = "mcpServers")]
    servers: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawServerEntry {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    timeout: Option<f64>,
    #[serde(default)]
    sse_read_timeout: Option<f64>,
    #[serde(default, alias = "type")]
    transport: Option<String>,
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Load and parse a configuration file.
///
/// Malformed individual entries are logged and skipped; only an unreadable
/// file, invalid JSON, or a missing `mcpServers` object is an error.
pub fn load_config(path: &Path) -> Result<GatewayConfig, GatewayError> {
    let raw = std::fs::read_to_string(path).map_err(|e| GatewayError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    parse_config(&raw)
}

/// Parse configuration text.
///
/// `${VAR}` references inside string values are resolved after parsing.
pub fn parse_config(raw: &str) -> Result<GatewayConfig, GatewayError> {
    let parsed: RawConfig = serde_json::from_str(raw).map_err(|e| GatewayError::ConfigError {
        reason: format!("failed to parse config: {e}"),
    })?;

    let mut servers = Vec::with_capacity(parsed.servers.len());
    for (name, mut value) in parsed.servers {
        resolve_env_refs(&mut value);
        let entry = serde_json::from_value::<RawServerEntry>(value).map_err(|e| {
            GatewayError::ConfigError {
                reason: format!("server '{name}': {e}"),
            }
        });
        match entry.and_then(|entry| server_from_entry(&name, entry)) {
            Ok(server) => servers.push(server),
            Err(e) => {
                tracing::warn!(server = %name, error = %e, "skipping invalid server entry");
            }
        }
    }

    Ok(GatewayConfig { servers })
}

fn server_from_entry(name: &str, entry: RawServerEntry) -> Result<ServerConfig, GatewayError> {
    let invalid = |reason: String| GatewayError::ConfigError {
        reason: format!("server '{name}': {reason}"),
    };

    let transport = match (entry.command, entry.url) {
        (Some(_), Some(_)) => {
            return Err(invalid("both 'command' and 'url' are set".into()));
        }
        (Some(command), None) => {
            if command.trim().is_empty() {
                return Err(invalid("'command' is empty".into()));
            }
            TransportConfig::Stdio(StdioConfig {
                command,
                args: entry.args,
                env: entry.env,
                cwd: entry.cwd,
            })
        }
        (None, Some(url)) => {
            let http = HttpConfig {
                url,
                headers: entry.headers,
                connect_timeout: seconds(entry.timeout, DEFAULT_CONNECT_TIMEOUT_SECS)
                    .map_err(|e| invalid(format!("'timeout' {e}")))?,
                stream_timeout: seconds(entry.sse_read_timeout, DEFAULT_STREAM_TIMEOUT_SECS)
                    .map_err(|e| invalid(format!("'sse_read_timeout' {e}")))?,
                tools: entry.tools,
            };
            match entry.transport.as_deref() {
                None | Some("http" | "streamable_http" | "streamable-http" | "sse") => {
                    TransportConfig::StreamingHttp(http)
                }
                Some("direct" | "direct_http" | "direct-http") => TransportConfig::DirectHttp(http),
                Some(other) => return Err(invalid(format!("unknown transport '{other}'"))),
            }
        }
        (None, None) => return Err(invalid("needs either 'command' or 'url'".into())),
    };

    Ok(ServerConfig {
        name: name.to_string(),
        transport,
    })
}

fn seconds(value: Option<f64>, default: f64) -> Result<Duration, String> {
    let secs = value.unwrap_or(default);
    Duration::try_from_secs_f64(secs).map_err(|_| format!("must be a non-negative number, got {secs}"))
}

// ─── Environment References ──────────────────────────────────────────────────

/// Resolve `${VAR}` and `${VAR:-default}` in every string of `value`.
///
/// Object keys are left alone. Values are substituted as plain text, so
/// quotes or backslashes in a variable cannot change the document shape.
fn resolve_env_refs(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(text) if text.contains("${") => {
            *text = substitute_env(text);
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(resolve_env_refs),
        serde_json::Value::Object(map) => map.values_mut().for_each(resolve_env_refs),
        _ => {}
    }
}

/// Unset variables without a default become the empty string. An
/// unterminated `${` is kept verbatim.
fn substitute_env(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let reference = &rest[open + 2..];
        let Some(close) = reference.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        out.push_str(&env_value(&reference[..close]));
        rest = &reference[close + 1..];
    }

    out.push_str(rest);
    out
}

fn env_value(reference: &str) -> String {
    let (var, fallback) = match reference.split_once(":-") {
        Some((var, fallback)) => (var, Some(fallback)),
        None => (reference, None),
    };
    match (std::env::var(var), fallback) {
        (Ok(value), _) => value,
        (Err(_), Some(fallback)) => home_relative(fallback),
        (Err(_), None) => String::new(),
    }
}

/// `~/x` → `$HOME/x`.
fn home_relative(path: &str) -> String {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
        _ => path.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
