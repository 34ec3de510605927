//! # gas-sandbox-rs
//!
//! Run untrusted Google Apps Script inside the gas-fakes sandbox and report
//! its output, exposed as a single MCP tool over stdio.
//!
//! An invocation goes through four stages:
//!
//! 1. **Build**: the permission configuration is validated and translated into
//!    an ordered list of sandbox directives ([`DirectivePlan`]).
//! 2. **Compose**: the runtime bootstrap, the rendered directives and the
//!    caller's script are joined into one script ([`ComposedScript`]).
//! 3. **Execute**: the script is written to a uniquely named artifact, run by
//!    the interpreter (Node.js) and the artifact is removed afterwards
//!    ([`ScriptExecutor`]).
//! 4. **Report**: stdout or the error message becomes a [`ToolResponse`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use gas_sandbox_rs::prelude::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ExecutorConfig::builder()
//!         .interpreter("node")
//!         .timeout(Duration::from_secs(60))
//!         .build();
//!
//!     let tool = GasSandboxTool::new(Bootstrap::default(), ScriptExecutor::new(config)?);
//!     let response = tool.invoke(&ToolRequest::new(r#"console.log("hi")"#)).await;
//!
//!     assert!(!response.is_error);
//!     assert_eq!(response.text_content().trim(), "hi");
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Security Model
//!
//! The gas-fakes runtime is the security boundary: the directives decide which
//! Drive files and services the script may touch. The caller's script text is
//! inserted as-is and never escaped.

pub mod error;
pub mod prelude;
pub mod sandbox;
pub mod server;
pub mod tool;

// Re-export main types at crate root for convenience
pub use error::{Result, SandboxError};
pub use sandbox::artifact::ExecutionArtifact;
pub use sandbox::config::{ExecutorConfig, ExecutorConfigBuilder};
pub use sandbox::directives::{ControlField, Directive, DirectivePlan};
pub use sandbox::executor::ScriptExecutor;
pub use sandbox::permissions::{
    MethodWhitelists, SandboxConfig, ServiceControl, ServiceControls, WhitelistItem,
};
pub use sandbox::report::{ExecutionResult, ToolContent, ToolResponse};
pub use sandbox::script::{Bootstrap, ComposedScript};
pub use server::McpServer;
pub use tool::{GasSandboxTool, ToolRequest, TOOL_NAME};
