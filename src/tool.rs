//! The `run-gas-fakes-test` tool: request parsing and the invocation lifecycle.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::{Result, SandboxError};
use crate::sandbox::directives::DirectivePlan;
use crate::sandbox::executor::ScriptExecutor;
use crate::sandbox::permissions::{MethodWhitelists, SandboxConfig, ServiceControls, WhitelistItem};
use crate::sandbox::report::{ExecutionResult, ToolResponse};
use crate::sandbox::script::{Bootstrap, ComposedScript};

/// Name the tool is advertised under.
pub const TOOL_NAME: &str = "run-gas-fakes-test";

const TOOL_DESCRIPTION: &str = "Use this to safely execute a script of Google Apps Script \
    in a sandbox using gas-fakes.";

const SCRIPT_DESCRIPTION: &str = "Provide a Google Apps Script. The Google Apps Script is the \
    generated script or the script provided by a prompt. When you put the script in a function \
    like `function sample() { script }`, it is required to add `sample();` to run the function. \
    When you directly put the script, the script can be run. In the current stage, gas-fakes \
    cannot use `Logger.log`. So, please use `console.log` instead of it.";

/// Arguments of one tool invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    #[serde(rename = "gas_script", alias = "script")]
    pub script: String,
    #[serde(default, alias = "sandboxEnabled")]
    pub sandbox: Option<bool>,
    #[serde(default)]
    pub strict_sandbox: Option<bool>,
    #[serde(default, alias = "cleanupOnExit")]
    pub cleanup: Option<bool>,
    #[serde(default, alias = "whitelist")]
    pub whitelist_items: Option<Vec<WhitelistItem>>,
    #[serde(default)]
    pub service_controls: Option<ServiceControls>,
    #[serde(default, alias = "methodWhitelists")]
    pub method_whitelist: Option<MethodWhitelists>,
}

impl ToolRequest {
    /// A request for `script` with every setting left at its default.
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            sandbox: None,
            strict_sandbox: None,
            cleanup: None,
            whitelist_items: None,
            service_controls: None,
            method_whitelist: None,
        }
    }

    /// Parse the JSON arguments of a tool call.
    pub fn from_arguments(arguments: Value) -> Result<Self> {
        serde_json::from_value(arguments).map_err(|e| SandboxError::InvalidRequest(e.to_string()))
    }

    /// Parse tool call arguments from their JSON text.
    ///
    /// A [`Value`] keeps only the last of several duplicate keys; parsing the
    /// text directly lets repeated service control blocks merge.
    pub fn from_json(arguments: &str) -> Result<Self> {
        serde_json::from_str(arguments).map_err(|e| SandboxError::InvalidRequest(e.to_string()))
    }

    /// The permission configuration requested, with defaults applied.
    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            sandbox_enabled: self.sandbox.unwrap_or(true),
            strict_sandbox: self.strict_sandbox,
            cleanup_on_exit: self.cleanup,
            whitelist: self.whitelist_items.clone().unwrap_or_default(),
            service_controls: self.service_controls.clone().unwrap_or_default(),
            method_whitelists: self.method_whitelist.clone().unwrap_or_default(),
        }
    }
}

/// Runs caller scripts in the gas-fakes sandbox.
#[derive(Debug, Clone)]
pub struct GasSandboxTool {
    bootstrap: Bootstrap,
    executor: ScriptExecutor,
}

impl GasSandboxTool {
    pub fn new(bootstrap: Bootstrap, executor: ScriptExecutor) -> Self {
        Self {
            bootstrap,
            executor,
        }
    }

    pub fn name(&self) -> &str {
        TOOL_NAME
    }

    pub fn description(&self) -> &str {
        TOOL_DESCRIPTION
    }

    /// JSON Schema of the tool arguments.
    pub fn input_schema(&self) -> Value {
        let flag = |description: &str| json!({ "type": "boolean", "description": description });
        json!({
            "type": "object",
            "properties": {
                "gas_script": { "type": "string", "description": SCRIPT_DESCRIPTION },
                "sandbox": flag(
                    "The default is true. When this is true, the script is run with the sandbox. \
                     When this is false, the script is run without the sandbox."
                ),
                "strictSandbox": flag(
                    "The default is true. When this is true (and the sandbox is active), attempts \
                     to access non-whitelisted, non-session files will throw an error."
                ),
                "cleanup": flag(
                    "The default is true. If true, files created during the session are moved to \
                     the Google Drive trash. Set to false to leave artifacts for inspection."
                ),
                "whitelistItems": {
                    "type": "array",
                    "description": "Existing files on Google Drive the script may access.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string", "description": "File ID of file on Google Drive" },
                            "read": flag("Allow read operations"),
                            "write": flag("Allow write operations"),
                            "trash": flag("Allow trashing the file"),
                        },
                        "required": ["id"],
                    },
                },
                "serviceControls": {
                    "type": "object",
                    "description": "Per-service settings that override global settings. \
                                    The key is the service name (e.g., 'DriveApp').",
                    "additionalProperties": {
                        "type": "object",
                        "properties": {
                            "enabled": { "type": "boolean" },
                            "sandboxMode": { "type": "boolean" },
                            "strictSandbox": { "type": "boolean" },
                        },
                    },
                },
                "methodWhitelist": {
                    "type": "object",
                    "description": "Permitted method names, keyed by service name.",
                    "additionalProperties": { "type": "array", "items": { "type": "string" } },
                },
            },
            "required": ["gas_script"],
        })
    }

    /// Tool definition as advertised by `tools/list`.
    pub fn definition(&self) -> Value {
        json!({
            "name": self.name(),
            "description": self.description(),
            "inputSchema": self.input_schema(),
        })
    }

    /// Handle a tool call with raw JSON arguments. Never fails: every error
    /// becomes an error response.
    pub async fn call(&self, arguments: Value) -> ToolResponse {
        self.respond(ToolRequest::from_arguments(arguments)).await
    }

    /// Like [`GasSandboxTool::call`], with the arguments as JSON text.
    pub async fn call_json(&self, arguments: &str) -> ToolResponse {
        self.respond(ToolRequest::from_json(arguments)).await
    }

    async fn respond(&self, request: Result<ToolRequest>) -> ToolResponse {
        match request {
            Ok(request) => self.invoke(&request).await,
            Err(e) => ToolResponse::from(ExecutionResult::failure(&e)),
        }
    }

    /// Build, compose, execute and report one invocation.
    pub async fn invoke(&self, request: &ToolRequest) -> ToolResponse {
        let span = info_span!("invocation", id = %Uuid::new_v4().simple());
        async move {
            let result = self.run(request).await;
            match &result {
                Ok(stdout) => info!(bytes = stdout.len(), "script succeeded"),
                Err(e) => info!(error = %e, "script failed"),
            }
            ToolResponse::from(ExecutionResult::from(result))
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: &ToolRequest) -> Result<String> {
        let config = request.sandbox_config();
        let plan = DirectivePlan::build(&config)?;
        debug!(directives = plan.len(), "configuration built");

        let script = ComposedScript::compose(&self.bootstrap, &plan, &request.script)?;
        debug!(segments = script.segments().len(), "script composed");

        self.executor.execute(&script).await
    }
}
