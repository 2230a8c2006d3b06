//! Stdio backend connector.
//!
//! Each operation runs in its own session: spawn the configured command,
//! perform the handshake over its stdin/stdout, list or call, then reap the
//! child. Once the answer is in hand the child is killed outright; after a
//! failure it gets a short exit grace, bounded by the operation's deadline,
//! so its stderr can be collected. A session that is dropped mid-flight
//! (for example by a caller-side timeout) kills its child.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::config::{StdioConfig, TransportKind};
use super::connector::BackendConnector;
use super::content::CallResult;
use super::errors::{GatewayError, RpcError};
use super::protocol;
use super::transport::StdioTransport;
use super::types::ToolDescriptor;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Longest a failed child gets to exit after its stdin closes.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to wait for the stderr drain after a failed session.
const STDERR_GRACE: Duration = Duration::from_millis(500);

/// Stderr kept for error messages.
const STDERR_TAIL_CHARS: usize = 2000;

// ─── Connector ───────────────────────────────────────────────────────────────

/// Reaches a backend by launching it as a subprocess.
pub struct StdioConnector {
    name: String,
    config: StdioConfig,
}

impl StdioConnector {
    pub fn new(name: &str, config: StdioConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
        }
    }

    async fn open(&self, timeout: Duration) -> Result<StdioSession, RpcError> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args);
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.config.cwd {
            cmd.current_dir(dir);
        }

        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            RpcError::transport(format!(
                "failed to spawn '{}': {e}",
                self.config.command
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RpcError::transport("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RpcError::transport("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .map(|stderr| drain_stderr(self.name.clone(), stderr));

        tracing::debug!(
            server = %self.name,
            command = %self.config.command,
            pid = child.id().unwrap_or_default(),
            "spawned stdio backend"
        );

        Ok(StdioSession {
            server: self.name.clone(),
            child,
            transport: StdioTransport::new(&self.name, stdin, stdout),
            stderr,
            deadline: Instant::now().checked_add(timeout),
        })
    }

    async fn discover(&self, timeout: Duration) -> Result<Vec<ToolDescriptor>, RpcError> {
        let mut session = self.open(timeout).await?;
        let outcome = async {
            protocol::handshake(&mut session.transport).await?;
            protocol::list_tools(&mut session.transport).await
        }
        .await;
        session.finish(outcome).await
    }

    async fn call(
        &self,
        tool: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<CallResult, RpcError> {
        let mut session = self.open(timeout).await?;
        let outcome = async {
            protocol::handshake(&mut session.transport).await?;
            protocol::call_tool(&mut session.transport, tool, arguments).await
        }
        .await;
        session.finish(outcome).await
    }
}

#[async_trait]
impl BackendConnector for StdioConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport_kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn list_tools(&self, timeout: Duration) -> Result<Vec<ToolDescriptor>, GatewayError> {
        match tokio::time::timeout(timeout, self.discover(timeout)).await {
            Ok(result) => result.map_err(|e| e.into_discovery(&self.name)),
            Err(_) => Err(GatewayError::DiscoveryError {
                server: self.name.clone(),
                reason: format!("timed out after {}ms", timeout.as_millis()),
            }),
        }
    }

    async fn invoke(
        &self,
        tool: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<CallResult, GatewayError> {
        self.call(tool, arguments, timeout)
            .await
            .map_err(|e| e.into_invocation(&self.name, tool))
    }
}

// ─── Session ─────────────────────────────────────────────────────────────────

struct StdioSession {
    server: String,
    child: Child,
    transport: StdioTransport<ChildStdin, ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    deadline: Option<Instant>,
}

impl StdioSession {
    /// Close the session, attaching captured stderr to a failure.
    async fn finish<T>(mut self, outcome: Result<T, RpcError>) -> Result<T, RpcError> {
        match outcome {
            Ok(value) => {
                self.transport.close_input();
                if let Err(e) = self.child.kill().await {
                    tracing::debug!(server = %self.server, error = %e, "stdio backend already gone");
                }
                if let Some(handle) = self.stderr.take() {
                    handle.abort();
                }
                Ok(value)
            }
            Err(err) => {
                self.shutdown().await;
                let tail = self.stderr_tail().await;
                if !tail.is_empty() {
                    tracing::warn!(server = %self.server, stderr = %tail, "server stderr captured on failure");
                }
                Err(attach_stderr(err, &tail))
            }
        }
    }

    async fn shutdown(&mut self) {
        self.transport.close_input();

        let grace = match self.deadline {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(SHUTDOWN_TIMEOUT),
            None => SHUTDOWN_TIMEOUT,
        };
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(server = %self.server, %status, "stdio backend exited");
            }
            _ => {
                tracing::debug!(server = %self.server, "stdio backend did not exit, killing");
                let _ = self.child.kill().await;
            }
        }
    }

    async fn stderr_tail(&mut self) -> String {
        let Some(handle) = self.stderr.take() else {
            return String::new();
        };
        match tokio::time::timeout(STDERR_GRACE, handle).await {
            Ok(Ok(tail)) => tail.trim().to_string(),
            _ => String::new(),
        }
    }
}

/// Log the child's stderr and keep its tail.
fn drain_stderr(server: String, stderr: ChildStderr) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut tail = String::new();

        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(server = %server, line = %line, "server stderr");
            tail.push_str(&line);
            tail.push('\n');

            if tail.len() > STDERR_TAIL_CHARS {
                let mut cut = tail.len() - STDERR_TAIL_CHARS;
                while !tail.is_char_boundary(cut) {
                    cut += 1;
                }
                tail.drain(..cut);
            }
        }
        tail
    })
}

fn attach_stderr(err: RpcError, tail: &str) -> RpcError {
    if tail.is_empty() {
        return err;
    }
    match err {
        RpcError::Transport { reason } => RpcError::Transport {
            reason: format!("{reason}\n--- server stderr ---\n{tail}"),
        },
        RpcError::Malformed { reason } => RpcError::Malformed {
            reason: format!("{reason}\n--- server stderr ---\n{tail}"),
        },
        remote => remote,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
