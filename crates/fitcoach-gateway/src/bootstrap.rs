use std::sync::Arc;
use std::time::Duration;

use fitcoach_agents::{
    AgentRuntime, AnthropicProvider, ProviderConnector, ProviderManager, StdioMcpConnector,
};
use fitcoach_common::Result;
use fitcoach_config::{AppConfig, McpConfig};
use tracing::info;

/// One stdio connector per enabled MCP server, in name order.
pub fn mcp_connectors(config: &McpConfig) -> Vec<Arc<dyn ProviderConnector>> {
    let call_timeout = Duration::from_secs(config.tool_timeout_secs);
    config
        .enabled_servers()
        .map(|(name, server)| {
            Arc::new(StdioMcpConnector::new(name, server, call_timeout)) as Arc<dyn ProviderConnector>
        })
        .collect()
}

/// Start every enabled MCP server and wait until all are ready.
pub async fn start_providers(config: &AppConfig) -> Result<ProviderManager> {
    let connectors = mcp_connectors(&config.mcp);
    if connectors.is_empty() {
        info!("no MCP servers configured, tool use disabled");
        return Ok(ProviderManager::empty());
    }

    info!("starting {} MCP server(s)", connectors.len());
    ProviderManager::start_all(
        connectors,
        Duration::from_secs(config.mcp.startup_timeout_secs),
    )
    .await
}

/// Build the agent runtime over the Anthropic API and the started providers.
pub fn build_runtime(config: &AppConfig, providers: &ProviderManager) -> Result<AgentRuntime> {
    let api_key = config.require_api_key()?;
    let llm = AnthropicProvider::new(api_key.to_string()).with_base_url(config.llm.base_url.clone());

    Ok(AgentRuntime::from_config(
        Arc::new(llm),
        providers.registry(),
        config,
    ))
}

pub fn shutdown_grace(config: &AppConfig) -> Duration {
    Duration::from_secs(config.mcp.shutdown_grace_secs)
}
