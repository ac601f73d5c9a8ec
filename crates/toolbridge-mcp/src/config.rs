//! Configuration types for MCP servers.
//!
//! The document follows the Claude Desktop layout:
//! `{"mcpServers": {"<name>": {"command", "args", "env", "timeout"}}}`.

use crate::error::McpError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

/// Default per-request timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: f64 = 120.0;

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

/// Top-level MCP configuration.
///
/// Entries are decoded one at a time: an entry that does not decode is kept
/// aside in `invalid` with its reason and never affects its siblings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "RawConfig")]
pub struct McpConfig {
    #[serde(rename = "mcpServers")]
    pub servers: BTreeMap<String, McpServerConfig>,
    /// Entries that failed to decode, with the decode error.
    #[serde(skip)]
    pub invalid: BTreeMap<String, String>,
}

/// The document as written, before per-entry decoding.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default, rename = "mcpServers")]
    servers: BTreeMap<String, serde_json::Value>,
}

impl From<RawConfig> for McpConfig {
    fn from(raw: RawConfig) -> Self {
        let mut config = Self::default();
        for (name, entry) in raw.servers {
            match serde_json::from_value::<McpServerConfig>(entry) {
                Ok(server) => {
                    config.servers.insert(name, server);
                }
                Err(e) => {
                    config.invalid.insert(name, e.to_string());
                }
            }
        }
        config
    }
}

/// Configuration for a single MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Command to run (e.g., "npx", "python"). Resolved on PATH.
    pub command: String,
    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables layered over the inherited environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Timeout for each request in seconds (default: 120).
    #[serde(default = "default_timeout", rename = "timeout")]
    pub timeout_secs: f64,
}

impl McpServerConfig {
    /// Config for `command` with no args, no env and the default timeout.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// The request timeout as a `Duration`. Must be positive and finite.
    pub fn timeout(&self) -> Result<Duration, McpError> {
        if !(self.timeout_secs.is_finite() && self.timeout_secs > 0.0) {
            return Err(McpError::Config(format!(
                "timeout must be a positive number of seconds, got {}",
                self.timeout_secs
            )));
        }
        Duration::try_from_secs_f64(self.timeout_secs)
            .map_err(|e| McpError::Config(format!("invalid timeout {}: {e}", self.timeout_secs)))
    }
}

impl McpConfig {
    /// Parse a config document.
    pub fn from_json_str(content: &str) -> Result<Self, McpError> {
        serde_json::from_str(content).map_err(|e| McpError::Config(e.to_string()))
    }

    /// Load a config file. A missing file yields an empty config and a warning.
    pub fn load(path: &Path) -> Result<Self, McpError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("MCP config file not found: {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(McpError::Config(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        serde_json::from_str(&content)
            .map_err(|e| McpError::Config(format!("{}: {e}", path.display())))
    }
}
