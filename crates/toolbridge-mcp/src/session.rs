//! MCP session: one supervised server connection.
//!
//! Handles the MCP protocol handshake (initialize + initialized notification),
//! tool discovery (tools/list), tool invocation (tools/call) and the session
//! lifecycle.

use crate::catalog::{self, CallResult, ToolDescriptor};
use crate::config::McpServerConfig;
use crate::error::McpError;
use crate::transport::StdioTransport;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// MCP protocol version we support.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Starting,
    Ready,
    Stopping,
    Stopped,
    /// Spawn or handshake failed, or the server went away. Terminal.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not started",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A single MCP server process and its tool catalog.
#[derive(Debug)]
pub struct McpSession {
    name: String,
    config: McpServerConfig,
    state: Mutex<SessionState>,
    transport: Option<StdioTransport>,
    tools: Vec<ToolDescriptor>,
}

impl McpSession {
    /// Create a session that has not been started yet.
    pub fn new(name: impl Into<String>, config: McpServerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(SessionState::NotStarted),
            transport: None,
            tools: Vec::new(),
        }
    }

    /// Spawn the server, perform the handshake and discover its tools.
    ///
    /// On failure the session ends up `Failed` and its process is gone.
    pub async fn start(&mut self) -> Result<(), McpError> {
        let state = self.state();
        if state != SessionState::NotStarted {
            return Err(self.unavailable(state));
        }
        self.set_state(SessionState::Starting);

        let transport = match self
            .config
            .timeout()
            .and_then(|timeout| StdioTransport::spawn(&self.name, &self.config, timeout))
        {
            Ok(transport) => transport,
            Err(e) => {
                self.set_state(SessionState::Failed);
                return Err(e);
            }
        };

        if let Err(e) = self.handshake(&transport).await {
            transport.shutdown().await;
            self.set_state(SessionState::Failed);
            return Err(e);
        }

        self.tools = self.fetch_tools(&transport).await;
        self.transport = Some(transport);
        self.set_state(SessionState::Ready);

        tracing::info!(
            "MCP server '{}' started (command: {}, timeout: {}s, {} tools)",
            self.name,
            self.config.command,
            self.config.timeout_secs,
            self.tools.len()
        );
        Ok(())
    }

    async fn handshake(&self, transport: &StdioTransport) -> Result<(), McpError> {
        let init_params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "toolbridge",
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        let resp = transport
            .send_request("initialize", Some(init_params))
            .await?;

        if let Some(err) = resp.error {
            return Err(McpError::Handshake {
                name: self.name.clone(),
                code: err.code,
                message: err.message,
            });
        }

        transport
            .send_notification("notifications/initialized", None)
            .await
    }

    /// Fetch the catalog. Failures are logged and leave it empty.
    async fn fetch_tools(&self, transport: &StdioTransport) -> Vec<ToolDescriptor> {
        let resp = match transport
            .send_request("tools/list", Some(serde_json::json!({})))
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("Failed to fetch tools from '{}': {}", self.name, e);
                return Vec::new();
            }
        };

        if let Some(err) = resp.error {
            tracing::warn!(
                "Failed to fetch tools from '{}' (code {}): {}",
                self.name,
                err.code,
                err.message
            );
            return Vec::new();
        }

        let Some(result) = resp.result else {
            tracing::warn!("tools/list response from '{}' has no result", self.name);
            return Vec::new();
        };

        match catalog::parse_tool_list(&self.name, result) {
            Ok(tools) => {
                tracing::info!("Fetched {} tools from MCP server '{}'", tools.len(), self.name);
                tools
            }
            Err(e) => {
                tracing::warn!("{}", e);
                Vec::new()
            }
        }
    }

    /// Call a tool on this server by its original (unqualified) name.
    ///
    /// Only fails when the session is not ready; every per-call problem is
    /// reported through `CallResult::is_error`.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallResult, McpError> {
        let transport = self.ready_transport()?;

        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });

        let resp = match transport.send_request("tools/call", Some(params)).await {
            Ok(resp) => resp,
            Err(e) => return Ok(CallResult::error(e.to_string())),
        };

        if let Some(err) = resp.error {
            return Ok(CallResult::error(err.message));
        }

        let result = resp.result.unwrap_or_else(|| serde_json::json!({}));
        Ok(CallResult::from_tool_result(&result))
    }

    /// The tools exposed by this server.
    pub fn tools(&self) -> Result<&[ToolDescriptor], McpError> {
        self.ready_transport()?;
        Ok(&self.tools)
    }

    /// Get the server name.
    pub fn server_name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state. A ready session whose server has closed its
    /// output stream reports `Failed`.
    pub fn state(&self) -> SessionState {
        let state = *self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match (&self.transport, state) {
            (Some(transport), SessionState::Ready) if transport.is_closed() => SessionState::Failed,
            _ => state,
        }
    }

    /// Whether calls and catalog reads are currently allowed.
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Stop the server process. Stopping a session that is not running is a
    /// no-op.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != SessionState::Ready {
                return;
            }
            *state = SessionState::Stopping;
        }

        if let Some(transport) = &self.transport {
            transport.shutdown().await;
        }

        self.set_state(SessionState::Stopped);
        tracing::info!("MCP server '{}' stopped", self.name);
    }

    fn ready_transport(&self) -> Result<&StdioTransport, McpError> {
        let state = self.state();
        match &self.transport {
            Some(transport) if state == SessionState::Ready => Ok(transport),
            _ => Err(self.unavailable(state)),
        }
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn unavailable(&self, state: SessionState) -> McpError {
        McpError::ServerUnavailable {
            name: self.name.clone(),
            state: state.to_string(),
        }
    }
}
