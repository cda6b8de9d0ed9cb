//! Codex CLI adapter.
//!
//! Invokes `codex exec` in read-only sandbox mode with `--json`, which emits
//! one structured JSON event per stdout line. The prompt is written to stdin
//! (the `-` argument) so arbitrarily long prompts avoid argv limits.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::InvocationError;

use super::{check_exit, run_with_timeout, BackendAdapter, BackendKind, InvocationRequest, RawOutput};

/// Adapter for the Codex CLI.
pub struct CodexAdapter {
    /// Binary to launch.
    command: String,
}

impl CodexAdapter {
    pub fn new() -> Self {
        Self {
            command: "codex".to_string(),
        }
    }

    /// Creates the adapter with a custom binary path.
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Builds the argument list for one invocation.
    ///
    /// The generation task never needs write access, so the sandbox stays
    /// read-only and approvals are disabled.
    fn build_args(request: &InvocationRequest) -> Vec<String> {
        let mut args = vec![
            "-a".to_string(),
            "never".to_string(),
            "exec".to_string(),
            "-s".to_string(),
            "read-only".to_string(),
            "--skip-git-repo-check".to_string(),
            "--json".to_string(),
        ];
        if let Some(ref model) = request.model {
            args.push("-m".to_string());
            args.push(model.clone());
        }
        args.push("-".to_string());
        args
    }
}

impl Default for CodexAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendAdapter for CodexAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Codex
    }

    async fn invoke(&self, request: &InvocationRequest) -> Result<RawOutput, InvocationError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(Self::build_args(request));

        debug!(timeout = ?request.timeout, "Invoking codex backend");
        let output = run_with_timeout(cmd, Some(&request.prompt), request.timeout).await?;
        check_exit(&output)?;

        Ok(RawOutput::EventStream(
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
            prompt: "explain 火".to_string(),
            timeout: Duration::from_secs(180),
            model: model.map(String::from),
        }
    }

    #[test]
    fn test_build_args_defaults() {
        let args = CodexAdapter::build_args(&request(None));
        assert_eq!(
            args,
            vec![
                "-a",
                "never",
                "exec",
                "-s",
                "read-only",
                "--skip-git-repo-check",
                "--json",
                "-"
            ]
        );
    }

    #[test]
    fn test_build_args_with_model() {
        let args = CodexAdapter::build_args(&request(Some("o4-mini")));
        assert!(args.windows(2).any(|w| w == ["-m", "o4-mini"]));
        // Prompt always arrives on stdin, never in argv.
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn test_adapter_kind() {
        assert_eq!(CodexAdapter::new().kind(), BackendKind::Codex);
    }
}
