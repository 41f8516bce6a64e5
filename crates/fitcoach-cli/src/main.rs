mod logging;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fitcoach_config::{AppConfig, ConfigLoader};
use fitcoach_gateway::{GatewayServer, bootstrap};
use tracing::info;

#[derive(Parser)]
#[command(name = "fitcoach", version, about = "Fitness coaching chat backend with MCP tools")]
struct Cli {
    /// Path to the YAML config file (default: ./fitcoach.yaml)
    #[arg(short, long, global = true, env = "FITCOACH_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `fitcoach_agents=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the tool providers and serve the chat API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Start the tool providers, print the merged tool catalog, and exit
    Tools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref(), cli.log_json);

    let mut config = ConfigLoader::new(cli.config)
        .load()
        .context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            info!(
                "starting fitcoach v{} with model {}",
                env!("CARGO_PKG_VERSION"),
                config.llm.model
            );
            GatewayServer::new(config).run().await?;
        }
        Command::Tools => print_tools(&config).await?,
    }

    Ok(())
}

async fn print_tools(config: &AppConfig) -> anyhow::Result<()> {
    let mut providers = bootstrap::start_providers(config).await?;
    let catalog = providers.registry().catalog().await;

    if catalog.is_empty() {
        println!("No tools available. Add MCP servers under `mcp.servers` in fitcoach.yaml.");
    } else {
        println!("{:<28} {:<12} DESCRIPTION", "TOOL", "PROVIDER");
        for tool in catalog.definitions() {
            let summary = tool.description.lines().next().unwrap_or_default();
            println!(
                "{:<28} {:<12} {}",
                tool.name,
                catalog.owner(&tool.name).unwrap_or("-"),
                summary
            );
        }
    }

    providers.shutdown(bootstrap::shutdown_grace(config)).await;
    Ok(())
}
