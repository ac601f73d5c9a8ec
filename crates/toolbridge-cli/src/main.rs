//! toolbridge: start the configured MCP servers, then list or call their tools.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::io;
use std::path::PathBuf;
use toolbridge_mcp::{McpConfig, McpManager};

/// Config file used when neither `--config` nor the env var is set.
const DEFAULT_CONFIG_FILE: &str = "mcp-config.json";

#[derive(Parser)]
#[command(
    name = "toolbridge",
    version,
    about = "Run MCP tool providers and call their tools"
)]
struct Cli {
    /// Path to the MCP server config (`{"mcpServers": {...}}`)
    #[arg(
        long,
        global = true,
        env = "TOOLBRIDGE_MCP_CONFIG",
        default_value = DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    /// Enable verbose/debug logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Log output format (logs go to stderr)
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every tool from every running server as JSON
    Tools,
    /// Call a tool by its qualified name (`<server>__<tool>`)
    Call {
        /// Qualified tool name, e.g. `filesystem__read_file`
        name: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Show running servers and their tool counts
    Servers,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    // Validate input before any server is spawned.
    let arguments = match &cli.command {
        Command::Call { args, .. } => Some(parse_arguments(args)?),
        Command::Tools | Command::Servers => None,
    };

    let config = McpConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    let mut manager = McpManager::new(config);
    manager.start_all().await;

    let outcome = run(&manager, cli.command, arguments).await;
    manager.stop_all().await;

    if outcome? {
        std::process::exit(1);
    }
    Ok(())
}

/// Run one command against the started manager. Returns `true` when the
/// tool reported an error.
async fn run(
    manager: &McpManager,
    command: Command,
    arguments: Option<serde_json::Value>,
) -> Result<bool> {
    match command {
        Command::Tools => {
            let listing = serde_json::json!({ "tools": manager.all_tools() });
            println!("{}", serde_json::to_string_pretty(&listing)?);
            Ok(false)
        }
        Command::Call { name, .. } => {
            let arguments = arguments.unwrap_or_else(|| serde_json::json!({}));
            tracing::debug!("MCP tool call: {} with args: {}", name, arguments);
            let result = manager
                .call_tool(&name, arguments)
                .await
                .with_context(|| format!("Failed to call MCP tool '{name}'"))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(result.is_error)
        }
        Command::Servers => {
            let summary = manager.server_summary();
            if summary.is_empty() {
                eprintln!("No MCP servers running");
            }
            for (name, tools) in summary {
                println!("{name}\t{tools} tools");
            }
            Ok(false)
        }
    }
}

/// Parse `--args` into a JSON object.
fn parse_arguments(raw: &str) -> Result<serde_json::Value> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("--args must be valid JSON")?;
    if !value.is_object() {
        bail!("--args must be a JSON object, got: {raw}");
    }
    Ok(value)
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn call_defaults_to_empty_arguments() {
        let cli = Cli::try_parse_from(["toolbridge", "call", "fs__read_file"]).unwrap();
        match cli.command {
            Command::Call { name, args } => {
                assert_eq!(name, "fs__read_file");
                assert_eq!(args, "{}");
            }
            _ => panic!("Expected call"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "toolbridge",
            "tools",
            "--config",
            "/etc/toolbridge/mcp.json",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/toolbridge/mcp.json"));
        assert!(cli.log_format == LogFormat::Json);
        assert!(matches!(cli.command, Command::Tools));
    }

    #[test]
    fn arguments_must_be_an_object() {
        assert_eq!(
            parse_arguments(r#"{"path": "/tmp/a.txt"}"#).unwrap()["path"],
            "/tmp/a.txt"
        );
        assert!(parse_arguments("[1, 2]").is_err());
        assert!(parse_arguments("not json").is_err());
    }
}
