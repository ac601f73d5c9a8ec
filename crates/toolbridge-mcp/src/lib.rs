//! Supervisor for MCP (Model Context Protocol) tool-provider processes.
//!
//! Each configured server is spawned as a child process speaking
//! newline-delimited JSON-RPC 2.0 over stdio, initialized with a handshake,
//! and its tools are published under `<server>__<tool>` names. The
//! [`McpManager`] aggregates every server's catalog and routes calls back to
//! the owning process.

pub mod catalog;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod manager;
pub mod session;
mod transport;

pub use catalog::{CallResult, ImageContent, ToolContent, ToolDescriptor};
pub use config::{McpConfig, McpServerConfig};
pub use error::McpError;
pub use manager::McpManager;
pub use session::{McpSession, SessionState};
