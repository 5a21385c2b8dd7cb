use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use code_index_mcp::config::TransportMode;
use code_index_mcp::errors::Result;
use code_index_mcp::mcp::{build_registry, http, Dispatcher, McpServer};
use code_index_mcp::session::{SessionContext, SharedSession};
use code_index_mcp::settings::default_settings_root;
use code_index_mcp::shutdown::ShutdownSignal;

/// Model Context Protocol server for code indexing.
#[derive(Parser)]
#[command(name = "code-index-mcp", version, about = "MCP server for code indexing and search")]
struct ServerConfig {
    /// Serve the HTTP bridge instead of stdio
    #[arg(long)]
    http: bool,
    /// Cloud deployment flag; any non-empty value selects the HTTP bridge
    #[arg(long, env = "RAILWAY", hide_env_values = true)]
    railway: Option<String>,
    /// HTTP port; setting it selects the HTTP bridge
    #[arg(long, env = "PORT")]
    port: Option<String>,
    /// HTTP listen address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Project to bind at startup
    #[arg(long)]
    project_path: Option<String>,
    /// Root directory for per-project settings
    #[arg(long)]
    settings_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = ServerConfig::parse();
    // Exit explicitly: a pending blocking stdin read would otherwise hold
    // the runtime open after a termination signal.
    match run(config).await {
        Ok(()) => process::exit(0),
        Err(e) => {
            error!("fatal: {}", e);
            process::exit(1);
        }
    }
}

async fn run(config: ServerConfig) -> Result<()> {
    let mode = TransportMode::select(config.http, config.railway.as_deref(), config.port.as_deref())?;
    let settings_root = config.settings_dir.unwrap_or_else(default_settings_root);

    let mut signals = ShutdownSignal::install()?;
    info!("initializing code indexer");
    let session = SharedSession::new(SessionContext::new(settings_root));
    let dispatcher = Dispatcher::new(build_registry()?, session.clone());

    if let Some(path) = &config.project_path {
        let summary = session.lock().bind_project(path)?;
        info!(base_path = %summary.base_path, files = summary.file_count, "startup project bound");
    } else {
        info!("server ready; waiting for set_project_path");
    }

    let served = tokio::select! {
        result = serve(mode, &config.host, dispatcher) => result,
        name = signals.recv() => {
            info!(signal = name, "termination signal received");
            Ok(())
        }
    };

    let teardown = session.shutdown();
    served.and(teardown)
}

async fn serve(mode: TransportMode, host: &str, dispatcher: Dispatcher) -> Result<()> {
    match mode {
        TransportMode::Stdio => McpServer::new(dispatcher).run().await,
        TransportMode::Http { port } => http::serve(dispatcher, host, port).await,
    }
}
