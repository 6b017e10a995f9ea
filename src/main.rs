//! Decompiler MCP bridge
//!
//! This binary serves the analysis tools over MCP stdio and relays each call
//! to a running analysis backend over TCP.

use anyhow::Context;
use clap::{Parser, Subcommand};
use decomp_mcp::bridge::{self, connect_tcp, run_transport};
use decomp_mcp::config::BridgeConfig;
use decomp_mcp::{AnalysisTools, DecompMcpServer};
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "decomp-mcp", version, about = "Decompiler MCP bridge")]
struct Cli {
    /// TOML config file
    #[arg(long, global = true, env = "DECOMP_MCP_CONFIG")]
    config: Option<PathBuf>,
    /// Backend address (host:port)
    #[arg(long, global = true, env = "DECOMP_MCP_BACKEND")]
    backend: Option<String>,
    /// Backend project name
    #[arg(long, global = true, env = "DECOMP_MCP_PROJECT")]
    project: Option<String>,
    /// Per-request timeout in seconds (max: 600)
    #[arg(long, global = true, env = "DECOMP_MCP_TIMEOUT")]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the MCP server over stdio (default)
    Serve,
    /// Run a single tool operation against the backend and print the result
    Probe {
        #[command(subcommand)]
        action: ProbeCommand,
    },
}

#[derive(Subcommand)]
enum ProbeCommand {
    /// Count defined functions
    Count,
    /// List one page of function names
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = decomp_mcp::tools::DEFAULT_PAGE_SIZE)]
        page_size: u32,
    },
    /// Decompile a function by hex address or name
    Decompile { target: String },
    /// References to and from an address or symbol
    Refs { target: String },
}

fn main() -> anyhow::Result<()> {
    // Initialize logging to stderr (stdout is used for MCP protocol)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("decomp_mcp=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => rt.block_on(run_server(config)),
        Command::Probe { action } => rt.block_on(run_probe(config, action)),
    }
}

fn resolve_config(cli: &Cli) -> anyhow::Result<BridgeConfig> {
    let mut config = BridgeConfig::load(cli.config.as_deref())?;
    if let Some(backend) = &cli.backend {
        config.backend_addr = backend.clone();
    }
    if let Some(project) = &cli.project {
        config.project = project.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        config.request_timeout_secs = secs;
    }
    config.validate()?;
    Ok(config)
}

/// Connect to the backend and start the transport task.
async fn connect(config: &BridgeConfig) -> anyhow::Result<(AnalysisTools, JoinHandle<()>)> {
    info!(addr = %config.backend_addr, project = %config.project, "Connecting to backend");
    let stream = connect_tcp(&config.backend_addr, config.connect_timeout())
        .await
        .with_context(|| format!("failed to connect to backend at {}", config.backend_addr))?;

    let (bridge, receiver) = bridge::channel(config.queue_capacity);
    let transport = tokio::spawn(async move {
        match run_transport(receiver, stream).await {
            Ok(()) => info!("Transport finished"),
            Err(e) => error!(error = %e, "Transport stopped"),
        }
    });

    let tools = AnalysisTools::new(bridge, config.project.clone(), config.request_timeout());
    Ok((tools, transport))
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigquit = signal(SignalKind::quit())?;
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
            _ = sigquit.recv() => {},
            _ = tokio::signal::ctrl_c() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}

async fn run_server(config: BridgeConfig) -> anyhow::Result<()> {
    info!("Starting decompiler MCP server");
    let (tools, transport) = connect(&config).await?;

    info!("MCP server listening on stdio");
    let server = DecompMcpServer::new(tools);
    let mut service = Some(server.serve(stdio()).await?);
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_signal = shutdown_notify.clone();

    tokio::spawn(async move {
        if wait_for_shutdown_signal().await.is_ok() {
            info!("Shutdown signal received");
            shutdown_signal.notify_one();
        } else {
            warn!("Shutdown signal handler failed; server will continue running");
        }
    });

    loop {
        tokio::select! {
            _ = shutdown_notify.notified() => {
                if let Some(running) = service.take() {
                    let _ = running.cancel().await?;
                }
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if let Some(running) = service.as_ref() {
                    if running.is_transport_closed() {
                        if let Some(running) = service.take() {
                            let _ = running.waiting().await?;
                        }
                        break;
                    }
                }
            }
        }
    }

    info!("MCP server shutting down");
    transport.abort();
    info!("Server stopped");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_probe(config: BridgeConfig, action: ProbeCommand) -> anyhow::Result<()> {
    let (tools, transport) = connect(&config).await?;

    let result = match action {
        ProbeCommand::Count => tools
            .function_count()
            .await
            .map(|count| serde_json::json!({ "function_count": count })),
        ProbeCommand::List { page, page_size } => {
            tools
                .list_functions(page, page_size)
                .await
                .map(|functions| {
                    serde_json::json!({
                        "page": page,
                        "page_size": page_size,
                        "functions": functions,
                    })
                })
        }
        ProbeCommand::Decompile { target } => tools
            .get_decompilation(&target)
            .await
            .and_then(|d| serde_json::to_value(d).map_err(Into::into)),
        ProbeCommand::Refs { target } => tools
            .get_references(&target)
            .await
            .and_then(|r| serde_json::to_value(r).map_err(Into::into)),
    };

    transport.abort();
    print_json(&result?)
}
