use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use mcp_bridge::bridge::{JsonFileRegistry, McpBridge, OutboundResponse, TransportKind};
use mcp_bridge::Operation;
use mcp_bridge::config;

/// Invoke MCP tool servers configured in the dashboard settings.
#[derive(Debug, Parser)]
#[command(name = "mcp-bridge", version, about)]
struct Cli {
    /// Bridge config file (YAML).
    #[arg(long, global = true, env = "MCP_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Settings document with `mcpServers`.
    #[arg(long, global = true, env = "MCP_BRIDGE_SETTINGS")]
    settings: Option<PathBuf>,

    /// Transport: piped_stdin or file_redirect.
    #[arg(long, global = true, env = "MCP_BRIDGE_TRANSPORT")]
    transport: Option<TransportKind>,

    /// Upper bound for one server run.
    #[arg(long, global = true, env = "MCP_BRIDGE_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Write logs to a rotated file in this directory instead of stderr.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read a resource (`resources/read`).
    Read { server: String, uri: String },
    /// Call a tool (`tools/call`).
    Call {
        server: String,
        tool: String,
        /// Tool arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// List configured server names.
    Servers,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = mcp_bridge::init_tracing(cli.log_dir.as_deref(), cli.log_json) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::from(2);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "mcp-bridge failed");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = config::load_or_default(cli.config.as_deref())?;
    if let Some(settings) = cli.settings {
        config.settings_path = settings;
    }
    if let Some(transport) = cli.transport {
        config.transport = transport;
    }
    if let Some(timeout_secs) = cli.timeout_secs {
        config.timeout_secs = timeout_secs;
    }
    config.validate()?;

    let bridge = McpBridge::from_config(&config);

    let (server, operation) = match cli.command {
        Command::Servers => {
            let names = JsonFileRegistry::new(&config.settings_path)
                .list()
                .map_err(|e| anyhow::anyhow!("{e}: {}", e.detail().unwrap_or_default()))?;
            for name in names {
                let marker = if bridge.is_allowed(&name) { "" } else { " (not allowed)" };
                println!("{name}{marker}");
            }
            return Ok(ExitCode::SUCCESS);
        }
        Command::Read { server, uri } => (server, Operation::ReadResource { uri }),
        Command::Call { server, tool, args } => {
            let arguments: serde_json::Value =
                serde_json::from_str(&args).context("--args must be valid JSON")?;
            anyhow::ensure!(arguments.is_object(), "--args must be a JSON object");
            (
                server,
                Operation::CallTool {
                    name: tool,
                    arguments,
                },
            )
        }
    };

    // Dropping the invocation on Ctrl-C kills the server process.
    let outcome = tokio::select! {
        outcome = bridge.invoke(&server, operation) => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(server = %server, "interrupted");
            return Ok(ExitCode::from(130));
        }
    };

    let code = if outcome.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    };
    let body = OutboundResponse::from(outcome);
    println!(
        "{}",
        serde_json::to_string_pretty(&body).context("failed to serialize response")?
    );
    Ok(code)
}
