//! Scratchpad MCP Server - multi-provider model routing over stdio.

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use scratchpad_mcp::config::env_lookup;
use scratchpad_mcp::tools::ToolContext;
use scratchpad_mcp::{
    ModelRouter, Orchestrator, ProviderRegistry, RouterConfig, ScratchpadServer, ServerConfig,
};

/// Scratchpad MCP Server - routes prompts across AI model providers.
#[derive(Parser, Debug)]
#[command(name = "scratchpad-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a JSON config file; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON.
    #[arg(long, default_value = "false")]
    json_logs: bool,

    /// Per-call provider timeout in seconds (0 disables).
    #[arg(long)]
    call_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // stdout carries the protocol, so logs go to stderr
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            ServerConfig::load(path)?
        }
        None => ServerConfig::default(),
    };
    if let Some(secs) = args.call_timeout_secs {
        config.routing.call_timeout_secs = Some(secs);
    }

    let registry = ProviderRegistry::from_config(&config, env_lookup);
    if registry.is_empty() {
        warn!("no providers configured; set an API key environment variable");
    }

    let router = ModelRouter::with_config(registry, RouterConfig::from(&config));
    let orchestrator = Orchestrator::new(router);

    let mut server = ScratchpadServer::new(ToolContext::new(orchestrator, config));
    server.run_stdio().await?;

    Ok(())
}
