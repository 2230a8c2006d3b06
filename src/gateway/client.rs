//! Tool gateway: the caller-facing orchestrator.
//!
//! Owns the connectors, the tool registry, and the rate limiter. Lifecycle is
//! `Uninitialized → Initializing → Ready`, entered once; afterwards the
//! gateway serves any number of concurrent discoveries and calls.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::OnceCell;
use tokio::time::Instant;

use super::config::{load_config, GatewayConfig};
use super::connector::{build_connector, BackendConnector};
use super::content::CallResult;
use super::errors::GatewayError;
use super::rate_limit::{RateLimiter, DEFAULT_POLL_INTERVAL};
use super::registry::ToolRegistry;
use super::schema::FunctionSchema;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Per-backend bound on one discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

// ─── Public Types ────────────────────────────────────────────────────────────

/// Lifecycle state of a [`ToolGateway`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Tunables that are not part of the configuration file.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Sleep cap between rate-limiter attempts.
    pub poll_interval: Duration,
    /// Per-backend bound on `list_tools` during discovery.
    pub discovery_timeout: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }
}

/// Outcome of one discovery pass.
#[derive(Debug)]
pub struct DiscoveryReport {
    /// Translated schemas, sorted by tool name.
    pub schemas: Vec<FunctionSchema>,
    /// Per-backend failures and rejected duplicates. Never fatal.
    pub failures: Vec<GatewayError>,
}

struct ReadyState {
    connectors: Vec<Arc<dyn BackendConnector>>,
    limiter: RateLimiter,
}

// ─── ToolGateway ─────────────────────────────────────────────────────────────

/// Routes tool discovery and tool calls to the configured backends.
pub struct ToolGateway {
    options: GatewayOptions,
    initializing: AtomicBool,
    ready: OnceCell<ReadyState>,
    registry: RwLock<ToolRegistry>,
}

impl Default for ToolGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolGateway {
    pub fn new() -> Self {
        Self::with_options(GatewayOptions::default())
    }

    pub fn with_options(options: GatewayOptions) -> Self {
        Self {
            options,
            initializing: AtomicBool::new(false),
            ready: OnceCell::new(),
            registry: RwLock::new(ToolRegistry::new()),
        }
    }

    /// A gateway that is already `Ready` with the given connectors.
    pub fn with_connectors(
        connectors: Vec<Arc<dyn BackendConnector>>,
        rate_limit_per_second: f64,
        options: GatewayOptions,
    ) -> Self {
        let mut connectors = connectors;
        connectors.sort_by(|a, b| a.name().cmp(b.name()));

        Self {
            options,
            initializing: AtomicBool::new(true),
            ready: OnceCell::new_with(Some(ReadyState {
                connectors,
                limiter: RateLimiter::new(rate_limit_per_second),
            })),
            registry: RwLock::new(ToolRegistry::new()),
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Load `config_path` and build one connector per configured server.
    ///
    /// Never fails: an unreadable configuration means zero servers, and a
    /// connector that cannot be built is skipped. The returned list holds
    /// those failures. Calling this on a gateway that is already `Ready` is
    /// a no-op returning no failures.
    pub async fn initialize(
        &self,
        config_path: &Path,
        rate_limit_per_second: f64,
    ) -> Vec<GatewayError> {
        let mut failures = Vec::new();
        let failures_out = &mut failures;

        self.ready
            .get_or_init(|| async move {
                self.initializing.store(true, Ordering::SeqCst);
                let config = match load_config(config_path) {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::error!(
                            path = %config_path.display(),
                            error = %e,
                            "could not load server configuration, continuing with no servers"
                        );
                        failures_out.push(e);
                        GatewayConfig::default()
                    }
                };
                let (ready, construction) = build_ready(&config, rate_limit_per_second);
                failures_out.extend(construction);
                ready
            })
            .await;

        failures
    }

    /// Like [`initialize`](Self::initialize) with an already parsed config.
    pub async fn initialize_with_config(
        &self,
        config: &GatewayConfig,
        rate_limit_per_second: f64,
    ) -> Vec<GatewayError> {
        let mut failures = Vec::new();
        let failures_out = &mut failures;

        self.ready
            .get_or_init(|| async move {
                self.initializing.store(true, Ordering::SeqCst);
                let (ready, construction) = build_ready(config, rate_limit_per_second);
                failures_out.extend(construction);
                ready
            })
            .await;

        failures
    }

    pub fn state(&self) -> GatewayState {
        if self.ready.initialized() {
            GatewayState::Ready
        } else if self.initializing.load(Ordering::SeqCst) {
            GatewayState::Initializing
        } else {
            GatewayState::Uninitialized
        }
    }

    fn ready_state(&self) -> Result<&ReadyState, GatewayError> {
        self.ready.get().ok_or(GatewayError::NotInitialized)
    }

    // ─── Discovery ───────────────────────────────────────────────────────

    /// List tools on every backend concurrently and update the registry.
    ///
    /// `selected` is an allow-list of tool names; empty means all. Tools
    /// registered by an earlier discovery stay callable as long as their
    /// backend still lists them. A backend that fails keeps whatever it
    /// registered before and is reported in `failures`.
    pub async fn discover(&self, selected: &[String]) -> Result<DiscoveryReport, GatewayError> {
        let ready = self.ready_state()?;
        let timeout = self.options.discovery_timeout;
        let started = Instant::now();

        let results = join_all(ready.connectors.iter().map(|connector| async move {
            let outcome = match tokio::time::timeout(timeout, connector.list_tools(timeout)).await
            {
                Ok(result) => result,
                Err(_) => Err(GatewayError::DiscoveryError {
                    server: connector.name().to_string(),
                    reason: format!("timed out after {}ms", timeout.as_millis()),
                }),
            };
            (connector, outcome)
        }))
        .await;

        let mut failures = Vec::new();
        {
            let mut registry = self.write_registry();
            for (connector, outcome) in results {
                match outcome {
                    Ok(tools) => {
                        let listed: HashSet<&str> =
                            tools.iter().map(|tool| tool.name.as_str()).collect();
                        registry.prune_server(connector.name(), &listed);

                        let accepted: Vec<_> = tools
                            .iter()
                            .filter(|tool| selected.is_empty() || selected.contains(&tool.name))
                            .cloned()
                            .collect();

                        tracing::info!(
                            server = %connector.name(),
                            listed = tools.len(),
                            accepted = accepted.len(),
                            "discovered tools"
                        );
                        failures.extend(registry.register_server_tools(connector, accepted));
                    }
                    Err(e) => {
                        tracing::warn!(server = %connector.name(), error = %e, "discovery failed");
                        failures.push(e);
                    }
                }
            }
        }

        let schemas = {
            let registry = self.read_registry();
            if selected.is_empty() {
                registry.to_function_schemas()?
            } else {
                let mut names: Vec<String> = selected
                    .iter()
                    .filter(|name| registry.get(name).is_some())
                    .cloned()
                    .collect();
                names.sort();
                names.dedup();
                registry.to_function_schemas_filtered(&names)?
            }
        };

        tracing::info!(
            tools = schemas.len(),
            failures = failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "discovery complete"
        );

        Ok(DiscoveryReport { schemas, failures })
    }

    /// Discover and return only the schemas.
    pub async fn fetch_tool_schemas(
        &self,
        selected: &[String],
    ) -> Result<Vec<FunctionSchema>, GatewayError> {
        Ok(self.discover(selected).await?.schemas)
    }

    // ─── Tool Execution ──────────────────────────────────────────────────

    /// Execute a tool call on the backend that owns it.
    ///
    /// Steps:
    /// 1. Wait for a rate-limiter permit
    /// 2. Find the owning connector
    /// 3. Check the arguments are an object (`null` counts as `{}`)
    /// 4. Invoke under a hard deadline; on expiry the call is dropped
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<CallResult, GatewayError> {
        let ready = self.ready_state()?;
        ready.limiter.acquire(self.options.poll_interval).await;

        let connector = self
            .get_owning_connector(name)
            .ok_or_else(|| GatewayError::ToolNotFound {
                name: name.to_string(),
            })?;

        let arguments = match arguments {
            serde_json::Value::Null => serde_json::json!({}),
            serde_json::Value::Object(_) => arguments,
            other => {
                return Err(GatewayError::InvalidArguments {
                    tool: name.to_string(),
                    reason: format!("expected a JSON object, got {}", json_kind(&other)),
                })
            }
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, connector.invoke(name, arguments, timeout)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(result)) => {
                tracing::info!(
                    tool = name,
                    server = %connector.name(),
                    elapsed_ms,
                    "tool call succeeded"
                );
                Ok(result)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    tool = name,
                    server = %connector.name(),
                    elapsed_ms,
                    error = %e,
                    "tool call failed"
                );
                Err(e)
            }
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(
                    tool = name,
                    server = %connector.name(),
                    timeout_ms,
                    "tool call timed out"
                );
                Err(GatewayError::Timeout {
                    tool: name.to_string(),
                    timeout_ms,
                })
            }
        }
    }

    /// The connector that owns `name`, if it has been discovered.
    pub fn get_owning_connector(&self, name: &str) -> Option<Arc<dyn BackendConnector>> {
        self.read_registry().connector_for_tool(name)
    }

    // ─── Status ──────────────────────────────────────────────────────────

    /// Names of the live connectors, sorted.
    pub fn connector_names(&self) -> Vec<String> {
        self.ready
            .get()
            .map(|ready| {
                ready
                    .connectors
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names of the registered tools, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        self.read_registry()
            .tool_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, ToolRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, ToolRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build connectors for every server, collecting construction failures.
fn build_ready(config: &GatewayConfig, rate_limit_per_second: f64) -> (ReadyState, Vec<GatewayError>) {
    let mut connectors = Vec::with_capacity(config.servers.len());
    let mut failures = Vec::new();

    for server in &config.servers {
        match build_connector(server) {
            Ok(connector) => connectors.push(connector),
            Err(e) => {
                tracing::error!(server = %server.name, error = %e, "failed to construct connector");
                failures.push(e);
            }
        }
    }
    connectors.sort_by(|a, b| a.name().cmp(b.name()));

    tracing::info!(
        configured = config.servers.len(),
        live = connectors.len(),
        rate_limit_per_second,
        "gateway ready"
    );

    let ready = ReadyState {
        connectors,
        limiter: RateLimiter::new(rate_limit_per_second),
    };
    (ready, failures)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
