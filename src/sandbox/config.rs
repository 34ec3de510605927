//! Executor configuration with builder pattern.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for running composed scripts.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Interpreter program used to run the artifact.
    pub interpreter: PathBuf,
    /// Arguments placed before the artifact path.
    pub interpreter_args: Vec<String>,
    /// Directory the artifacts are written to.
    pub artifact_dir: PathBuf,
    /// File extension of the artifacts.
    pub artifact_extension: String,
    /// Working directory of the interpreter; inherited when unset.
    pub working_dir: Option<PathBuf>,
    /// Delay between writing the artifact and starting the interpreter.
    pub settle_delay: Duration,
    /// Maximum execution time before the interpreter is killed.
    pub timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("node"),
            interpreter_args: Vec::new(),
            artifact_dir: PathBuf::from("."),
            artifact_extension: "mjs".to_string(),
            working_dir: None,
            settle_delay: Duration::ZERO,
            timeout: Duration::from_secs(300),
        }
    }
}

impl ExecutorConfig {
    /// Create a new builder for ExecutorConfig.
    pub fn builder() -> ExecutorConfigBuilder {
        ExecutorConfigBuilder::default()
    }
}

/// Builder for creating ExecutorConfig instances.
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfigBuilder {
    interpreter: Option<PathBuf>,
    interpreter_args: Vec<String>,
    artifact_dir: Option<PathBuf>,
    artifact_extension: Option<String>,
    working_dir: Option<PathBuf>,
    settle_delay: Option<Duration>,
    timeout: Option<Duration>,
}

impl ExecutorConfigBuilder {
    /// Set the interpreter program.
    pub fn interpreter(mut self, program: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(program.into());
        self
    }

    /// Append an interpreter argument.
    pub fn interpreter_arg(mut self, arg: impl Into<String>) -> Self {
        self.interpreter_args.push(arg.into());
        self
    }

    /// Append several interpreter arguments.
    pub fn interpreter_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interpreter_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the directory artifacts are written to.
    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    /// Set the artifact file extension (without the dot).
    pub fn artifact_extension(mut self, extension: impl Into<String>) -> Self {
        self.artifact_extension = Some(extension.into());
        self
    }

    /// Set the working directory of the interpreter.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the settle delay between write and launch.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = Some(delay);
        self
    }

    /// Set the maximum execution timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the ExecutorConfig.
    pub fn build(self) -> ExecutorConfig {
        let default = ExecutorConfig::default();
        ExecutorConfig {
            interpreter: self.interpreter.unwrap_or(default.interpreter),
            interpreter_args: self.interpreter_args,
            artifact_dir: self.artifact_dir.unwrap_or(default.artifact_dir),
            artifact_extension: self.artifact_extension.unwrap_or(default.artifact_extension),
            working_dir: self.working_dir.or(default.working_dir),
            settle_delay: self.settle_delay.unwrap_or(default.settle_delay),
            timeout: self.timeout.unwrap_or(default.timeout),
        }
    }
}
