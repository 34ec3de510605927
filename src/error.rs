//! Error types for the script sandbox.

use thiserror::Error;

/// Errors that can occur while building, composing or executing a script.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Invalid or contradictory permission configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A directive could not be rendered into script text.
    #[error("failed to compose script: {0}")]
    Composition(String),

    /// The tool arguments could not be parsed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The interpreter process could not be started.
    #[error("failed to start interpreter: {0}")]
    Spawn(#[source] std::io::Error),

    /// The script raised an exception that reached the top level.
    #[error("{exception_type}: {message}")]
    ScriptException {
        /// The exception name (e.g., "Error", "TypeError").
        exception_type: String,
        /// The exception message.
        message: String,
        /// The stack frames printed after the exception line, if any.
        stack: Option<String>,
    },

    /// The interpreter exited unsuccessfully without a recognizable exception.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The execution exceeded the configured timeout.
    #[error("execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// I/O error while handling the script artifact.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Create a script exception error from interpreter stderr.
    pub fn from_script_stderr(stderr: &str) -> Option<Self> {
        parse_script_exception(stderr)
    }

    /// Check if this error is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, SandboxError::Config(_))
    }

    /// Check if this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout(_))
    }

    /// Check if this error represents an exception thrown by the script.
    pub fn is_script_exception(&self) -> bool {
        matches!(self, SandboxError::ScriptException { .. })
    }

    /// The text reported back to the caller.
    ///
    /// Script exceptions are reduced to their message; stack frames and
    /// artifact paths never leave the process.
    pub fn user_message(&self) -> String {
        match self {
            SandboxError::ScriptException { message, exception_type, .. } => {
                if message.is_empty() {
                    exception_type.clone()
                } else {
                    message.clone()
                }
            }
            SandboxError::ExecutionFailed(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Parse a JavaScript exception from interpreter stderr.
///
/// Node prints the offending source line and a caret before the exception
/// line, followed by indented `at ...` frames:
///
/// ```text
/// file:///tmp/gas-sandbox-1234.mjs:5
/// throw new Error("boom");
/// ^
///
/// Error: boom
///     at file:///tmp/gas-sandbox-1234.mjs:5:7
/// ```
pub fn parse_script_exception(stderr: &str) -> Option<SandboxError> {
    if stderr.trim().is_empty() {
        return None;
    }

    let lines: Vec<&str> = stderr.lines().collect();
    let (line_idx, (exception_type, message)) = lines
        .iter()
        .enumerate()
        .find_map(|(idx, line)| split_exception_line(line).map(|parts| (idx, parts)))?;

    let frames: Vec<&str> = lines[line_idx + 1..]
        .iter()
        .take_while(|line| line.starts_with(' ') || line.starts_with('\t'))
        .copied()
        .collect();
    let stack = if frames.is_empty() {
        None
    } else {
        Some(frames.join("\n"))
    };

    Some(SandboxError::ScriptException {
        exception_type: exception_type.to_string(),
        message: message.to_string(),
        stack,
    })
}

/// Split a JavaScript exception line into its name and message.
///
/// Accepts `Name: message`, Node's `Name [ERR_CODE]: message` and a bare
/// `Name`, optionally prefixed with `Uncaught `. The name keeps its code.
fn split_exception_line(line: &str) -> Option<(&str, &str)> {
    if line.starts_with(' ') || line.starts_with('\t') {
        return None;
    }
    let line = line.trim_start_matches("Uncaught ").trim_end();

    let (head, message) = match line.find(':') {
        Some(colon_pos) => (&line[..colon_pos], line[colon_pos + 1..].trim()),
        None => (line, ""),
    };
    let name = match head.split_once(" [") {
        Some((name, code)) if is_error_code(code) => name,
        Some(_) => return None,
        None => head,
    };

    if !name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
        return None;
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return None;
    }

    (name.ends_with("Error") || name.ends_with("Exception")).then_some((head, message))
}

/// `ERR_MODULE_NOT_FOUND]`, the bracketed code after an error name.
fn is_error_code(code: &str) -> bool {
    code.strip_suffix(']').is_some_and(|code| {
        !code.is_empty()
            && code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
    })
}
