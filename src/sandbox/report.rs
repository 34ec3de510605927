//! Mapping of execution outcomes to the tool response shape.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};

/// Text reported when a successful script printed nothing.
pub const EMPTY_OUTPUT_PLACEHOLDER: &str = "Done.";

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Captured stdout output.
    pub stdout: String,
    /// Whether the invocation failed at any stage.
    pub failed: bool,
    /// User-facing error message when `failed` is set.
    pub error_message: Option<String>,
}

impl ExecutionResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            failed: false,
            error_message: None,
        }
    }

    pub fn failure(error: &SandboxError) -> Self {
        Self {
            stdout: String::new(),
            failed: true,
            error_message: Some(error.user_message()),
        }
    }

    /// Check if the execution was successful.
    pub fn is_success(&self) -> bool {
        !self.failed
    }
}

impl From<Result<String>> for ExecutionResult {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(stdout) => Self::success(stdout),
            Err(e) => Self::failure(&e),
        }
    }
}

/// One content block of a tool response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

/// The response returned for every tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub content: Vec<ToolContent>,
    pub is_error: bool,
}

impl ToolResponse {
    pub fn text(text: impl Into<String>, is_error: bool) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error,
        }
    }

    /// Concatenated text of all content blocks.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|ToolContent::Text { text }| text.as_str())
            .collect()
    }
}

impl From<ExecutionResult> for ToolResponse {
    fn from(result: ExecutionResult) -> Self {
        if result.failed {
            let message = result
                .error_message
                .unwrap_or_else(|| "execution failed".to_string());
            Self::text(message, true)
        } else if result.stdout.is_empty() {
            Self::text(EMPTY_OUTPUT_PLACEHOLDER, false)
        } else {
            Self::text(result.stdout, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_response() {
        let response = ToolResponse::from(ExecutionResult::success("hi\n"));
        assert!(!response.is_error);
        assert_eq!(response.text_content(), "hi\n");
    }

    #[test]
    fn test_empty_stdout_placeholder() {
        let response = ToolResponse::from(ExecutionResult::from(Ok::<_, SandboxError>(String::new())));
        assert!(!response.is_error);
        assert_eq!(response.text_content(), EMPTY_OUTPUT_PLACEHOLDER);
    }

    #[test]
    fn test_failure_reports_message_only() {
        let error = SandboxError::ScriptException {
            exception_type: "Error".to_string(),
            message: "boom".to_string(),
            stack: Some("    at file:///tmp/gas-sandbox-1.mjs:5:7".to_string()),
        };
        let result = ExecutionResult::from(Err::<String, _>(error));
        assert!(!result.is_success());

        let response = ToolResponse::from(result);
        assert!(response.is_error);
        assert_eq!(response.text_content(), "boom");
    }

    #[test]
    fn test_wire_shape() {
        let response = ToolResponse::text("hi\n", false);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "content": [{ "type": "text", "text": "hi\n" }], "isError": false })
        );
    }
}
