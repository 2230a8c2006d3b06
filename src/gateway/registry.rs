//! Tool registry: tool name → owning backend.
//!
//! Built during discovery and consulted on every call. Tool names are
//! global across backends; when two backends expose the same name, the
//! backend whose server name sorts first keeps it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::connector::BackendConnector;
use super::errors::GatewayError;
use super::schema::{self, FunctionSchema};
use super::types::ToolDescriptor;

// ─── RegistryEntry ───────────────────────────────────────────────────────────

/// One registered tool and the connector that serves it.
#[derive(Clone)]
pub struct RegistryEntry {
    pub server: String,
    pub descriptor: ToolDescriptor,
    pub connector: Arc<dyn BackendConnector>,
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("server", &self.server)
            .field("tool", &self.descriptor.name)
            .finish()
    }
}

// ─── ToolRegistry ────────────────────────────────────────────────────────────

/// Aggregated tool registry across all backends.
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, RegistryEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register tools served by `connector`.
    ///
    /// Entries already owned by the same server are overwritten. A name owned
    /// by a different server goes to whichever server name sorts first; each
    /// conflict is returned as a `DuplicateToolName` naming the kept owner
    /// (`existing`) and the rejected one (`incoming`).
    pub fn register_server_tools(
        &mut self,
        connector: &Arc<dyn BackendConnector>,
        tools: Vec<ToolDescriptor>,
    ) -> Vec<GatewayError> {
        let server = connector.name();
        let mut conflicts = Vec::new();

        for descriptor in tools {
            if let Some(current) = self.tools.get(&descriptor.name) {
                if current.server != server {
                    let (kept, rejected) = if current.server.as_str() < server {
                        (current.server.clone(), server.to_string())
                    } else {
                        (server.to_string(), current.server.clone())
                    };

                    tracing::warn!(
                        tool = %descriptor.name,
                        kept = %kept,
                        rejected = %rejected,
                        "duplicate tool name across servers"
                    );
                    conflicts.push(GatewayError::DuplicateToolName {
                        name: descriptor.name.clone(),
                        existing: kept.clone(),
                        incoming: rejected,
                    });

                    if kept != server {
                        continue;
                    }
                }
            }

            self.tools.insert(
                descriptor.name.clone(),
                RegistryEntry {
                    server: server.to_string(),
                    descriptor,
                    connector: Arc::clone(connector),
                },
            );
        }

        conflicts
    }

    /// Drop tools owned by `server_name` that it no longer lists.
    ///
    /// Tools it still lists stay registered even when the current discovery
    /// did not select them.
    pub fn prune_server(&mut self, server_name: &str, listed: &HashSet<&str>) {
        self.tools
            .retain(|name, entry| entry.server != server_name || listed.contains(name.as_str()));
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.tools.get(name)
    }

    /// The connector serving `name`.
    pub fn connector_for_tool(&self, name: &str) -> Option<Arc<dyn BackendConnector>> {
        self.tools.get(name).map(|entry| Arc::clone(&entry.connector))
    }

    /// All registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Function schemas for every registered tool, sorted by name.
    pub fn to_function_schemas(&self) -> Result<Vec<FunctionSchema>, GatewayError> {
        let names = self.tool_names();
        schema::translate_all(names.into_iter().filter_map(|name| {
            self.tools
                .get(name)
                .map(|entry| (entry.server.as_str(), &entry.descriptor))
        }))
    }

    /// Function schemas for the named tools, in the given order.
    ///
    /// Names not in the registry are skipped.
    pub fn to_function_schemas_filtered(
        &self,
        names: &[String],
    ) -> Result<Vec<FunctionSchema>, GatewayError> {
        schema::translate_all(names.iter().filter_map(|name| {
            self.tools
                .get(name)
                .map(|entry| (entry.server.as_str(), &entry.descriptor))
        }))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
