use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gas_sandbox_rs::sandbox::script::DEFAULT_RUNTIME_ENTRY;
use gas_sandbox_rs::{Bootstrap, ExecutorConfig, GasSandboxTool, McpServer, ScriptExecutor};

/// MCP server that runs Google Apps Script in the gas-fakes sandbox.
#[derive(Parser, Debug)]
#[command(name = "gas-sandbox-mcp")]
#[command(author, version, about)]
struct Cli {
    /// Interpreter used to run composed scripts
    #[arg(long, env = "GAS_SANDBOX_INTERPRETER", default_value = "node")]
    interpreter: PathBuf,

    /// Extra interpreter argument, placed before the script path (repeatable)
    #[arg(long = "interpreter-arg", allow_hyphen_values = true)]
    interpreter_args: Vec<String>,

    /// Module specifier of the gas-fakes runtime, relative to the artifact directory
    #[arg(long, env = "GAS_SANDBOX_RUNTIME_ENTRY", default_value = DEFAULT_RUNTIME_ENTRY)]
    runtime_entry: String,

    /// Directory transient script files are written to
    #[arg(long, env = "GAS_SANDBOX_ARTIFACT_DIR", default_value = ".")]
    artifact_dir: PathBuf,

    /// Kill a script after this many seconds
    #[arg(long, env = "GAS_SANDBOX_TIMEOUT_SECS", default_value_t = 300)]
    timeout_secs: u64,

    /// Wait this many milliseconds between writing a script and running it
    #[arg(long, env = "GAS_SANDBOX_SETTLE_MS", default_value_t = 0)]
    settle_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the protocol, so logs go to stderr
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = ExecutorConfig::builder()
        .interpreter(cli.interpreter)
        .interpreter_args(cli.interpreter_args)
        .artifact_dir(cli.artifact_dir)
        .timeout(Duration::from_secs(cli.timeout_secs))
        .settle_delay(Duration::from_millis(cli.settle_ms))
        .build();
    let executor = ScriptExecutor::new(config).context("invalid executor configuration")?;

    info!(
        interpreter = %executor.config().interpreter.display(),
        artifact_dir = %executor.config().artifact_dir.display(),
        "gas-sandbox-mcp v{} listening on stdio",
        env!("CARGO_PKG_VERSION")
    );

    let tool = GasSandboxTool::new(Bootstrap::new(cli.runtime_entry), executor);
    McpServer::new(tool)
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("server failed")?;

    info!("stdin closed, shutting down");
    Ok(())
}
