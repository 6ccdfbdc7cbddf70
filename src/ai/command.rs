//! External command decomposer.
//!
//! Runs a program with the spec as JSON on stdin and reads a
//! [`Decomposition`] as JSON from stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{Decomposition, PlanGenerationPort};
use crate::core::{AiConfig, CharterError, Result, Spec};

/// Port backed by a local program.
#[derive(Debug, Clone)]
pub struct ExternalCommandDecomposer {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ExternalCommandDecomposer {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new(), timeout: None }
    }

    /// Build from the `[ai]` config section, if a command is set.
    pub fn from_config(config: &AiConfig) -> Option<Self> {
        let program = config.command.as_deref()?.trim();
        if program.is_empty() {
            return None;
        }
        let mut port = Self::new(program).with_args(config.args.iter().cloned());
        if config.timeout_secs > 0 {
            port = port.with_timeout(Duration::from_secs(config.timeout_secs));
        }
        Some(port)
    }

    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn failure(&self, what: impl std::fmt::Display) -> CharterError {
        CharterError::Generation(format!("'{}' {what}", self.program))
    }
}

#[async_trait]
impl PlanGenerationPort for ExternalCommandDecomposer {
    async fn decompose_spec(
        &self,
        spec: &Spec,
        cancel: &CancellationToken,
    ) -> Result<Decomposition> {
        if cancel.is_cancelled() {
            return Err(CharterError::Cancelled);
        }

        let input = serde_json::to_vec(spec)
            .map_err(|e| CharterError::Generation(format!("cannot encode spec: {e}")))?;

        tracing::debug!(program = %self.program, args = ?self.args, "spawning decomposer");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.failure(format_args!("could not be started: {e}")))?;

        // Feed stdin while collecting output so neither pipe can stall the
        // other; the whole exchange sits under the timeout and the cancel.
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else { return Ok(()) };
            match stdin.write_all(&input).await {
                // A program may answer without reading its input.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        };
        let exchange = async move {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            fed.map_err(|e| self.failure(format_args!("did not accept input: {e}")))?;
            output.map_err(|e| self.failure(format_args!("failed: {e}")))
        };

        let timeout = self.timeout;
        let run = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, exchange)
                    .await
                    .map_err(|_| self.failure(format_args!("timed out after {}s", limit.as_secs())))?,
                None => exchange.await,
            }
        };

        // Dropping `run` drops the child, which kills it.
        let output = tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!(program = %self.program, "decomposer cancelled");
                return Err(CharterError::Cancelled);
            }
            output = run => output?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(format_args!("exited with {}: {}", output.status, stderr.trim())));
        }

        let decomposition: Decomposition = serde_json::from_slice(&output.stdout)
            .map_err(|e| self.failure(format_args!("returned invalid JSON: {e}")))?;

        tracing::info!(
            program = %self.program,
            tasks = decomposition.tasks.len(),
            tokens = decomposition.tokens_used,
            "decomposition received"
        );
        Ok(decomposition)
    }

    fn name(&self) -> &str {
        &self.program
    }
}
