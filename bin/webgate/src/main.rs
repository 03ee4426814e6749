mod server;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use webgate_core::Config;
use webgate_tools::browser::session::{RemoteConnector, SessionRegistry};
use webgate_tools::docs::DocsClient;
use webgate_tools::notify::Notifier;
use webgate_tools::resources::ResourceCatalog;
use webgate_tools::{ToolContext, ToolRegistry};

#[derive(Parser)]
#[command(name = "webgate")]
#[command(about = "MCP server for remote browser sessions and document collaboration", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing. Stdout carries the protocol stream, so logs go to
    // stderr.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = Config::from_env();

    let resources = Arc::new(ResourceCatalog::new());
    let (notifier, notifications) = Notifier::channel();
    let connector = Arc::new(RemoteConnector::new(
        config.browser_connect_string(),
        resources.clone(),
        notifier.clone(),
    ));
    let sessions = Arc::new(SessionRegistry::new(connector));
    let docs = Arc::new(DocsClient::new(config.docs_token.clone()));

    let ctx = ToolContext {
        config,
        sessions,
        resources,
        notifier,
        docs,
    };
    let registry = Arc::new(ToolRegistry::with_defaults());

    tracing::info!(tools = registry.tool_names().len(), "webgate starting on stdio");
    server::McpServer::new(ctx, registry)
        .run(notifications)
        .await
}
