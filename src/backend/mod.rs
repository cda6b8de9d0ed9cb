//! Backend adapters for CLI generation backends.
//!
//! Each adapter knows how to:
//! 1. Launch its backend binary with a rendered prompt
//! 2. Apply the configured timeout and capture exit status
//! 3. Return raw output in the shape that backend produces
//!
//! Adapters share a single invocation contract; the rest of the pipeline
//! never branches on backend identity. Adding a backend means adding an
//! adapter, never touching the orchestrator.

pub mod claude;
pub mod codex;

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::InvocationError;

pub use claude::ClaudeAdapter;
pub use codex::CodexAdapter;

/// Supported backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Claude CLI in plain-text print mode.
    Claude,
    /// Codex CLI in structured `--json` event-stream mode.
    Codex,
}

impl BackendKind {
    /// Returns the display name for this backend kind.
    pub fn display_name(&self) -> &'static str {
        match self {
            BackendKind::Claude => "claude",
            BackendKind::Codex => "codex",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" | "claude-code" => Ok(BackendKind::Claude),
            "codex" => Ok(BackendKind::Codex),
            other => Err(format!("Unknown backend: {}", other)),
        }
    }
}

/// One invocation request. Created per attempt, discarded afterwards.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Rendered prompt text.
    pub prompt: String,
    /// Hard deadline for the spawned process.
    pub timeout: Duration,
    /// Optional model override passed through to the backend CLI.
    pub model: Option<String>,
}

/// Raw, unprocessed backend output for one invocation.
///
/// Owned exclusively by the output extractor during extraction; not retained
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOutput {
    /// A single plain-text body (possibly fenced or padded).
    Text(String),
    /// A sequence of JSON events, one per line.
    EventStream(String),
}

/// Trait for backend adapters.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Returns the backend kind.
    fn kind(&self) -> BackendKind;

    /// Invokes the backend once with the given request.
    async fn invoke(&self, request: &InvocationRequest) -> Result<RawOutput, InvocationError>;
}

/// Creates an adapter for the given backend kind.
pub fn create_adapter(kind: BackendKind) -> Arc<dyn BackendAdapter> {
    match kind {
        BackendKind::Claude => Arc::new(ClaudeAdapter::new()),
        BackendKind::Codex => Arc::new(CodexAdapter::new()),
    }
}

/// Runs a prepared command to completion under a timeout.
///
/// The child is spawned with piped stdout/stderr and `kill_on_drop`, so a
/// timeout (which drops the in-flight future) also terminates the process.
/// When `stdin_data` is given the prompt is written to the child's stdin,
/// which is then closed. The stdin feed runs under the same deadline as the
/// wait: a child that never drains its pipe cannot stall the caller past
/// the timeout.
pub(crate) async fn run_with_timeout(
    mut cmd: Command,
    stdin_data: Option<&str>,
    timeout: Duration,
) -> Result<std::process::Output, InvocationError> {
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if stdin_data.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| InvocationError::ProcessSpawnFailure(e.to_string()))?;
    let stdin = child.stdin.take();

    let run = async move {
        if let Some(data) = stdin_data {
            if let Some(mut stdin) = stdin {
                stdin.write_all(data.as_bytes()).await.map_err(|e| {
                    InvocationError::ProcessSpawnFailure(format!(
                        "failed to write prompt to stdin: {}",
                        e
                    ))
                })?;
                // Dropping the handle closes stdin so the backend sees EOF.
            }
        }
        child
            .wait_with_output()
            .await
            .map_err(|e| InvocationError::ProcessSpawnFailure(e.to_string()))
    };

    match tokio::time::timeout(timeout, run).await {
        Ok(result) => result,
        Err(_) => Err(InvocationError::Timeout(timeout)),
    }
}

/// Maps a finished process to a success check shared by all adapters.
///
/// A non-zero exit becomes `BackendFailure` with the last part of stderr
/// attached verbatim (newlines escaped so the message stays one line).
pub(crate) fn check_exit(output: &std::process::Output) -> Result<(), InvocationError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(InvocationError::BackendFailure {
        code: output.status.code().unwrap_or(-1),
        stderr_tail: stderr_tail(&stderr),
    })
}

/// Returns the last 300 characters of stderr with newlines escaped.
pub(crate) fn stderr_tail(stderr: &str) -> String {
    let chars: Vec<char> = stderr.chars().collect();
    let start = chars.len().saturating_sub(300);
    chars[start..]
        .iter()
        .collect::<String>()
        .replace('\n', "\\n")
}
