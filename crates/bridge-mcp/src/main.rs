//! # bridge-mcp
//!
//! Speaker library bridge.
//!
//! ## Subcommands
//!
//! - `bridge-mcp stdio` (default): MCP over stdin/stdout
//! - `bridge-mcp serve [--bind ADDR]`: REST API and MCP over HTTP
//!
//! Configuration comes from `BRIDGE_*` environment variables; logging is
//! controlled by `RUST_LOG` and always goes to stderr.

use anyhow::Context;
use bridge_auth::TokenRefresher;
use bridge_mcp::clients::BridgeConfig;
use bridge_mcp::rest::{self, AppState};
use bridge_mcp::tools::all_tools;
use bridge_mcp::{transport, LibraryService, McpServer};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Authenticated speaker library access over MCP.
#[derive(Parser)]
#[command(name = "bridge-mcp", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdin/stdout (default when no subcommand given).
    Stdio,
    /// Serve the REST API and MCP over HTTP.
    Serve {
        /// Address to bind, overriding BRIDGE_BIND.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = BridgeConfig::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        "bridge-mcp v{} starting, default host {}",
        env!("CARGO_PKG_VERSION"),
        config.default_host
    );

    let service = Arc::new(
        LibraryService::from_config(&config).context("failed to build library service")?,
    );
    let server = Arc::new(McpServer::bridge());
    server.register_tools(all_tools(service.clone())).await;

    let refresher = config.refresh_interval().map(|interval| {
        info!(interval_secs = interval.as_secs(), "Starting token refresh loop");
        Arc::new(TokenRefresher::new(
            service.authenticator().clone(),
            service.credentials().clone(),
            config.known_hosts(),
            interval,
        ))
        .spawn()
    });

    let result = match cli.command.unwrap_or(Commands::Stdio) {
        Commands::Stdio => transport::run_stdio(&server)
            .await
            .context("stdio transport failed"),
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            rest::serve(&bind, AppState::new(service, server))
                .await
                .with_context(|| format!("HTTP server on {} failed", bind))
        }
    };

    if let Some(handle) = refresher {
        handle.stop().await;
    }
    info!("bridge-mcp stopped");
    result
}
