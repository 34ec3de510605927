//! Prelude module for convenient imports.

pub use crate::error::{Result, SandboxError};
pub use crate::sandbox::{
    config::ExecutorConfig,
    executor::ScriptExecutor,
    permissions::{SandboxConfig, ServiceControl, WhitelistItem},
    report::{ExecutionResult, ToolResponse},
    script::Bootstrap,
};
pub use crate::tool::{GasSandboxTool, ToolRequest};
