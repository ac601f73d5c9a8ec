//! Error types for MCP operations.

use std::time::Duration;
use thiserror::Error;

/// Errors from MCP server supervision and communication.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to spawn MCP server '{name}': {reason}")]
    Spawn { name: String, reason: String },

    #[error("MCP server '{name}' rejected initialize (code {code}): {message}")]
    Handshake {
        name: String,
        code: i64,
        message: String,
    },

    #[error("Failed to decode message from MCP server '{server}': {reason}")]
    ProtocolDecode { server: String, reason: String },

    #[error("Request timeout after {}s", .timeout.as_secs_f64())]
    RequestTimeout { timeout: Duration },

    #[error("Invalid tool name format: {name}")]
    InvalidToolName { name: String },

    #[error("MCP server '{name}' not found")]
    UnknownServer { name: String },

    #[error("MCP server '{name}' is not available ({state})")]
    ServerUnavailable { name: String, state: String },

    #[error("MCP config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_uses_whole_seconds() {
        let err = McpError::RequestTimeout {
            timeout: Duration::from_secs(120),
        };
        assert_eq!(err.to_string(), "Request timeout after 120s");
    }

    #[test]
    fn timeout_message_keeps_fractional_seconds() {
        let err = McpError::RequestTimeout {
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "Request timeout after 0.25s");
    }

    #[test]
    fn routing_errors_name_the_offender() {
        let err = McpError::UnknownServer {
            name: "github".into(),
        };
        assert_eq!(err.to_string(), "MCP server 'github' not found");

        let err = McpError::InvalidToolName {
            name: "nodelimiter".into(),
        };
        assert!(err.to_string().contains("nodelimiter"));
    }
}
