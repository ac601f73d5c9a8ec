//! Stdio transport for MCP server communication.
//!
//! Spawns a child process and manages async communication over stdin/stdout
//! using newline-delimited JSON-RPC messages. Stderr is drained into the log.

use crate::config::McpServerConfig;
use crate::error::McpError;
use crate::jsonrpc::{
    CONNECTION_CLOSED_ERROR_CODE, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, TIMEOUT_ERROR_CODE,
};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Read buffer for the server's stdout. Tool results can embed large base64
/// images, so lines of several megabytes are normal.
const STDOUT_BUFFER_BYTES: usize = 1024 * 1024;

/// How long a server gets to exit after SIGTERM before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<JsonRpcResponse>>>>;

/// Async stdio transport for communicating with an MCP server process.
pub struct StdioTransport {
    name: String,
    write_tx: mpsc::Sender<String>,
    pending: PendingMap,
    tasks: Vec<JoinHandle<()>>,
    child: Mutex<Child>,
    /// Cancelled when the transport is shut down.
    cancel: CancellationToken,
    /// Cancelled when stdout closes or the transport is shut down.
    closed: CancellationToken,
    timeout: Duration,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("closed", &self.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl StdioTransport {
    /// Resolve the command on PATH, spawn it, and start the background
    /// reader, stderr and writer tasks.
    pub fn spawn(
        name: &str,
        config: &McpServerConfig,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let resolved = which::which(&config.command).map_err(|e| McpError::Spawn {
            name: name.to_string(),
            reason: format!("command '{}' not found in PATH: {e}", config.command),
        })?;
        tracing::debug!(
            "Resolved MCP command '{}' to '{}'",
            config.command,
            resolved.display()
        );

        let mut cmd = build_command(&resolved, &config.args);
        cmd.envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::Spawn {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(McpError::Spawn {
                name: name.to_string(),
                reason: "failed to capture stdio pipes".to_string(),
            });
        };

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();
        let closed = cancel.child_token();

        let reader = BufReader::with_capacity(STDOUT_BUFFER_BYTES, stdout);
        let reader_handle = tokio::spawn(read_stdout(
            name.to_string(),
            reader,
            Arc::clone(&pending),
            closed.clone(),
        ));
        let stderr_handle = tokio::spawn(read_stderr(name.to_string(), stderr, cancel.clone()));

        let (write_tx, write_rx) = mpsc::channel::<String>(64);
        let writer_handle = tokio::spawn(write_stdin(
            name.to_string(),
            stdin,
            write_rx,
            closed.clone(),
        ));

        Ok(Self {
            name: name.to_string(),
            write_tx,
            pending,
            tasks: vec![reader_handle, stderr_handle, writer_handle],
            child: Mutex::new(child),
            cancel,
            closed,
            timeout,
        })
    }

    /// Whether the server's stdout has closed or the transport was shut down.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Send a JSON-RPC request and wait for the response.
    ///
    /// Timeouts and a closed connection come back as a synthetic error
    /// response, not as `Err`. `Err` means the request never reached stdin.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        if self.is_closed() {
            return Ok(self.closed_response());
        }

        let id = Uuid::new_v4().to_string();
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        // Register before writing so a fast reply always finds its slot.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if self.write_tx.send(line).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(self.stdin_closed());
        }

        tokio::select! {
            biased;
            outcome = tokio::time::timeout(self.timeout, rx) => match outcome {
                Ok(Ok(resp)) => Ok(resp),
                Ok(Err(_)) => Ok(self.closed_response()),
                Err(_) => {
                    self.pending.lock().await.remove(&id);
                    tracing::warn!(
                        "MCP server '{}' method '{}' timed out after {}s",
                        self.name,
                        method,
                        self.timeout.as_secs_f64()
                    );
                    let message = McpError::RequestTimeout { timeout: self.timeout }.to_string();
                    Ok(JsonRpcResponse::synthetic_error(TIMEOUT_ERROR_CODE, message))
                }
            },
            () = self.closed.cancelled() => {
                self.pending.lock().await.remove(&id);
                Ok(self.closed_response())
            }
        }
    }

    /// Send a JSON-RPC notification (fire-and-forget, no response expected).
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        let mut line = serde_json::to_string(&notification)?;
        line.push('\n');

        self.write_tx
            .send(line)
            .await
            .map_err(|_| self.stdin_closed())
    }

    /// Shut down the transport: stop the background tasks, ask the server to
    /// exit, wait up to five seconds, then kill it and reap it.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        // Dropping the senders releases every waiting request.
        self.pending.lock().await.clear();

        let mut child = self.child.lock().await;
        request_terminate(&mut child);

        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("MCP server '{}' exited with {}", self.name, status);
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to wait for MCP server '{}': {}", self.name, e);
            }
            Err(_) => {
                tracing::warn!(
                    "MCP server '{}' did not exit within {}s, killing it",
                    self.name,
                    SHUTDOWN_GRACE.as_secs()
                );
                // `kill` also waits, so the child is reaped either way.
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill MCP server '{}': {}", self.name, e);
                }
            }
        }

        for task in &self.tasks {
            task.abort();
        }
    }

    fn closed_response(&self) -> JsonRpcResponse {
        JsonRpcResponse::synthetic_error(
            CONNECTION_CLOSED_ERROR_CODE,
            format!("MCP server '{}' closed the connection", self.name),
        )
    }

    fn stdin_closed(&self) -> McpError {
        McpError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            format!("MCP server '{}' stdin is closed", self.name),
        ))
    }
}

/// Build the command for a resolved executable. Windows batch scripts have
/// to go through `cmd /c`.
fn build_command(resolved: &Path, args: &[String]) -> Command {
    #[cfg(windows)]
    {
        let is_script = resolved
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("cmd") || ext.eq_ignore_ascii_case("bat"));
        if is_script {
            let mut cmd = Command::new("cmd");
            cmd.arg("/c").arg(resolved).args(args);
            return cmd;
        }
    }

    let mut cmd = Command::new(resolved);
    cmd.args(args);
    cmd
}

#[cfg(unix)]
fn request_terminate(child: &mut Child) {
    let Some(pid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return; // already reaped
    };
    // SAFETY: `pid` is our own child and has not been reaped (`id()` returns
    // None after that), so it cannot refer to another process.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        tracing::debug!(
            "SIGTERM to pid {} failed: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn request_terminate(child: &mut Child) {
    // No SIGTERM here. The writer drops stdin once cancelled, which may not
    // have happened yet, so ask for a kill and let the grace wait reap it.
    if let Err(e) = child.start_kill() {
        tracing::debug!("Failed to request MCP server exit: {}", e);
    }
}

/// Drain queued lines into the child's stdin, one whole line per write.
async fn write_stdin(
    name: String,
    mut stdin: ChildStdin,
    mut write_rx: mpsc::Receiver<String>,
    closed: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            () = closed.cancelled() => break,
            msg = write_rx.recv() => match msg {
                Some(line) => line,
                None => break,
            },
        };
        if let Err(e) = write_line(&mut stdin, &line).await {
            tracing::warn!("Failed to write to MCP server '{}': {}", name, e);
            break;
        }
    }
    // Dropping stdin here sends EOF to the child.
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}

/// Read newline-delimited messages from stdout and route responses to their
/// waiting requests. Exits on EOF or cancellation, releasing whatever is
/// still pending.
async fn read_stdout<R>(name: String, mut reader: R, pending: PendingMap, closed: CancellationToken)
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = tokio::select! {
            () = closed.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Error reading from MCP server '{}': {}", name, e);
                break;
            }
        }

        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }

        let message: JsonRpcMessage = match serde_json::from_slice(line) {
            Ok(message) => message,
            Err(e) => {
                let err = McpError::ProtocolDecode {
                    server: name.clone(),
                    reason: e.to_string(),
                };
                tracing::warn!("{}: {}", err, String::from_utf8_lossy(line));
                continue;
            }
        };

        dispatch(&name, message, &pending).await;
    }

    tracing::debug!("MCP server '{}' stdout closed", name);
    closed.cancel();
    pending.lock().await.clear();
}

async fn dispatch(name: &str, message: JsonRpcMessage, pending: &PendingMap) {
    if message.is_notification() {
        if let Some(method) = &message.method {
            tracing::debug!("Received notification from '{}': {}", name, method);
        }
        return;
    }

    let Some(id) = message.correlation_id() else {
        tracing::debug!("Dropping message without a usable id from '{}'", name);
        return;
    };

    let slot = pending.lock().await.remove(&id);
    match slot {
        Some(tx) => {
            // The requester may have timed out in the meantime.
            let _ = tx.send(message.into_response());
        }
        None => match &message.method {
            Some(method) => tracing::debug!(
                "Ignoring request '{}' from MCP server '{}'",
                method,
                name
            ),
            None => tracing::debug!(
                "Dropping response for unknown request id {} from '{}'",
                id,
                name
            ),
        },
    }
}

/// Log each stderr line from the server. Never parsed as protocol.
async fn read_stderr(name: String, stderr: ChildStderr, cancel: CancellationToken) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = tokio::select! {
            () = cancel.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let text = text.trim();
                if !text.is_empty() {
                    tracing::warn!("[{} stderr] {}", name, text);
                }
            }
            Err(e) => {
                tracing::warn!("Error reading stderr from MCP server '{}': {}", name, e);
                break;
            }
        }
    }
}
