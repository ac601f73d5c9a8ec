//! MCP manager: supervises multiple MCP server sessions and routes tool
//! calls to them by qualified name.
//!
//! Lifecycle calls (`start_all`, `stop_all`) take `&mut self` and dispatch
//! calls (`all_tools`, `call_tool`) take `&self`, so the registry is never
//! mutated while a call is being routed. Applications that need both at once
//! wrap the manager in a `tokio::sync::RwLock`.

use crate::catalog::{self, CallResult, ToolDescriptor};
use crate::config::McpConfig;
use crate::error::McpError;
use crate::session::McpSession;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Manages connections to multiple MCP servers.
#[derive(Debug, Default)]
pub struct McpManager {
    config: McpConfig,
    sessions: BTreeMap<String, Arc<McpSession>>,
}

impl McpManager {
    /// Create a manager for `config`. Nothing is started yet.
    pub fn new(config: McpConfig) -> Self {
        Self {
            config,
            sessions: BTreeMap::new(),
        }
    }

    /// Create a manager from a config file.
    ///
    /// Never fails: a missing file is a warning and a malformed one an error
    /// in the log, and both leave the manager with no servers.
    pub fn load_config(path: &Path) -> Self {
        let config = McpConfig::load(path).unwrap_or_else(|e| {
            tracing::error!("Failed to load MCP config: {}", e);
            McpConfig::default()
        });
        Self::new(config)
    }

    /// The configuration this manager was built from.
    pub fn config(&self) -> &McpConfig {
        &self.config
    }

    /// Start all configured MCP servers that are not already running.
    ///
    /// Servers that fail to start are logged and left out; they never keep
    /// another server from starting. Returns the number of running sessions.
    pub async fn start_all(&mut self) -> usize {
        for (name, reason) in &self.config.invalid {
            let err = McpError::Config(format!("invalid entry for MCP server '{name}': {reason}"));
            tracing::error!("Failed to start MCP server '{}': {}", name, err);
        }

        let starts = self
            .config
            .servers
            .iter()
            .filter(|(name, _)| !self.sessions.contains_key(*name))
            .map(|(name, server_config)| {
                let mut session = McpSession::new(name.clone(), server_config.clone());
                async move {
                    let outcome = session.start().await;
                    (session, outcome)
                }
            });

        for (session, outcome) in join_all(starts).await {
            match outcome {
                Ok(()) => {
                    self.sessions
                        .insert(session.server_name().to_string(), Arc::new(session));
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to start MCP server '{}': {}",
                        session.server_name(),
                        e
                    );
                }
            }
        }

        tracing::info!("Started {} MCP servers", self.sessions.len());
        self.sessions.len()
    }

    /// Stop every running server and clear the registry.
    pub async fn stop_all(&mut self) {
        let sessions = std::mem::take(&mut self.sessions);
        join_all(sessions.values().map(|session| session.stop())).await;
    }

    /// All tools from all ready servers, in server order then catalog order.
    pub fn all_tools(&self) -> Vec<ToolDescriptor> {
        self.sessions
            .values()
            .filter_map(|session| session.tools().ok())
            .flat_map(|tools| tools.iter().cloned())
            .collect()
    }

    /// Call a tool by its qualified name (`<server>__<tool>`).
    pub async fn call_tool(
        &self,
        qualified_name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallResult, McpError> {
        let (server_name, tool_name) =
            catalog::split_qualified(qualified_name).ok_or_else(|| McpError::InvalidToolName {
                name: qualified_name.to_string(),
            })?;

        let session = self
            .sessions
            .get(server_name)
            .ok_or_else(|| McpError::UnknownServer {
                name: server_name.to_string(),
            })?;

        session.call_tool(tool_name, arguments).await
    }

    /// Look up a running session by server name.
    pub fn session(&self, server_name: &str) -> Option<Arc<McpSession>> {
        self.sessions.get(server_name).map(Arc::clone)
    }

    /// Number of running sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Get a summary of running servers and their tool counts.
    pub fn server_summary(&self) -> Vec<(&str, usize)> {
        self.sessions
            .iter()
            .map(|(name, session)| (name.as_str(), session.tools().map_or(0, <[_]>::len)))
            .collect()
    }
}
