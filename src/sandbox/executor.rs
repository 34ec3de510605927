//! Core execution engine: writes the artifact, runs the interpreter, cleans up.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, SandboxError};
use crate::sandbox::artifact::ExecutionArtifact;
use crate::sandbox::config::ExecutorConfig;
use crate::sandbox::script::ComposedScript;

/// Runs composed scripts in an external interpreter process.
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    config: ExecutorConfig,
}

impl ScriptExecutor {
    /// Create a new executor with the given configuration.
    ///
    /// A relative artifact directory is resolved against the current
    /// directory, so the artifact path stays valid for any working directory.
    pub fn new(mut config: ExecutorConfig) -> Result<Self> {
        config.artifact_dir = std::path::absolute(&config.artifact_dir)?;
        if !config.artifact_dir.is_dir() {
            return Err(SandboxError::Config(format!(
                "artifact directory does not exist: {}",
                config.artifact_dir.display()
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute a composed script and return its stdout.
    ///
    /// The artifact is removed before this returns, whatever the outcome.
    pub async fn execute(&self, script: &ComposedScript) -> Result<String> {
        let artifact =
            ExecutionArtifact::reserve(&self.config.artifact_dir, &self.config.artifact_extension);
        let result = self.run(&artifact, script).await;
        artifact.remove().await;
        result
    }

    async fn run(&self, artifact: &ExecutionArtifact, script: &ComposedScript) -> Result<String> {
        artifact.write(script).await?;

        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let mut command = Command::new(&self.config.interpreter);
        command
            .args(&self.config.interpreter_args)
            .arg(artifact.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(SandboxError::Spawn)?;
        debug!(pid = ?child.id(), "interpreter started");

        // Dropping the wait future on timeout drops the child, which kills it.
        let output =
            match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    warn!(timeout = ?self.config.timeout, "interpreter timed out, killing it");
                    return Err(SandboxError::Timeout(self.config.timeout));
                }
            };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            debug!(status = %output.status, "interpreter failed");
            return Err(failure_from_stderr(output.status, &stderr, artifact.path()));
        }
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "interpreter wrote to stderr");
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Stands in for the artifact path in reported errors.
const ARTIFACT_PLACEHOLDER: &str = "<script>";

/// Build the error for an unsuccessful interpreter run.
///
/// The artifact path is replaced by a placeholder. Stack frames are dropped
/// when stderr holds no recognizable exception.
fn failure_from_stderr(status: ExitStatus, stderr: &str, artifact: &Path) -> SandboxError {
    let path = artifact.display().to_string();
    let stderr = stderr
        .replace(&format!("file://{path}"), ARTIFACT_PLACEHOLDER)
        .replace(&path, ARTIFACT_PLACEHOLDER);

    SandboxError::from_script_stderr(&stderr).unwrap_or_else(|| {
        let text = stderr
            .lines()
            .filter(|line| !line.trim_start().starts_with("at "))
            .collect::<Vec<_>>()
            .join("\n");
        let text = text.trim();
        if text.is_empty() {
            SandboxError::ExecutionFailed(format!("interpreter exited with {status}"))
        } else {
            SandboxError::ExecutionFailed(text.to_string())
        }
    })
}
