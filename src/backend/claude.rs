//! Claude CLI adapter.
//!
//! Invokes `claude` in non-interactive print mode with plain-text output.
//! The prompt is passed as the final argument; the whole of stdout is the
//! raw output body.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::InvocationError;

use super::{check_exit, run_with_timeout, BackendAdapter, BackendKind, InvocationRequest, RawOutput};

/// Adapter for the Claude CLI.
pub struct ClaudeAdapter {
    /// Binary to launch.
    command: String,
}

impl ClaudeAdapter {
    pub fn new() -> Self {
        Self {
            command: "claude".to_string(),
        }
    }

    /// Creates the adapter with a custom binary path.
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Builds the argument list for one invocation.
    fn build_args(request: &InvocationRequest) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "text".to_string(),
            "--max-turns".to_string(),
            "3".to_string(),
        ];
        if let Some(ref model) = request.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.push(request.prompt.clone());
        args
    }
}

impl Default for ClaudeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendAdapter for ClaudeAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Claude
    }

    async fn invoke(&self, request: &InvocationRequest) -> Result<RawOutput, InvocationError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(Self::build_args(request));

        debug!(timeout = ?request.timeout, "Invoking claude backend");
        let output = run_with_timeout(cmd, None, request.timeout).await?;
        check_exit(&output)?;

        Ok(RawOutput::Text(
            String::from_utf8_lossy(&output.stdout).into_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(model: Option<&str>) -> InvocationRequest {
        InvocationRequest {
            prompt: "explain 水".to_string(),
            timeout: Duration::from_secs(180),
            model: model.map(String::from),
        }
    }

    #[test]
    fn test_build_args_defaults() {
        let args = ClaudeAdapter::build_args(&request(None));
        assert_eq!(
            args,
            vec!["-p", "--output-format", "text", "--max-turns", "3", "explain 水"]
        );
    }

    #[test]
    fn test_build_args_with_model() {
        let args = ClaudeAdapter::build_args(&request(Some("opus")));
        assert!(args.windows(2).any(|w| w == ["--model", "opus"]));
        assert_eq!(args.last().map(String::as_str), Some("explain 水"));
    }

    #[test]
    fn test_adapter_kind() {
        assert_eq!(ClaudeAdapter::new().kind(), BackendKind::Claude);
    }

    #[test]
    fn test_custom_command() {
        let adapter = ClaudeAdapter::with_command("/usr/local/bin/claude");
        assert_eq!(adapter.command, "/usr/local/bin/claude");
    }
}
