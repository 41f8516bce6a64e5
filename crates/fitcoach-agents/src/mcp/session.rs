use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fitcoach_common::{Error, Result, root_cause};
use fitcoach_config::McpServerConfig;
use rmcp::ServiceExt;
use rmcp::model::{CallToolRequestParams, CallToolResult, RawContent};
use rmcp::service::{Peer, RoleClient, RunningService};
use rmcp::transport::TokioChildProcess;
use tokio::process::Command;
use tracing::info;

use super::lifecycle::{ProviderConnection, ProviderConnector};
use crate::providers::ToolDefinition;
use crate::tools::{ToolContent, ToolProvider, join_text};

/// Spawns an MCP server as a child process and talks to it over stdio.
pub struct StdioMcpConnector {
    name: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    call_timeout: Duration,
}

impl StdioMcpConnector {
    pub fn new(name: &str, config: &McpServerConfig, call_timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
            call_timeout,
        }
    }
}

#[async_trait]
impl ProviderConnector for StdioMcpConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<Box<dyn ProviderConnection>> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args).envs(&self.env).kill_on_drop(true);

        let transport = TokioChildProcess::new(cmd).map_err(|e| {
            Error::Mcp(format!(
                "failed to spawn '{}': {}",
                self.command,
                root_cause(&e)
            ))
        })?;

        let service = ()
            .serve(transport)
            .await
            .map_err(|e| Error::Mcp(format!("handshake failed: {}", root_cause(&e))))?;

        info!("MCP server '{}' completed handshake", self.name);

        let session = Arc::new(McpSession {
            server_name: self.name.clone(),
            peer: service.peer().clone(),
            call_timeout: self.call_timeout,
        });

        Ok(Box::new(McpConnection { service, session }))
    }
}

/// A running MCP client service plus the shareable session handle.
struct McpConnection {
    service: RunningService<RoleClient, ()>,
    session: Arc<McpSession>,
}

#[async_trait]
impl ProviderConnection for McpConnection {
    fn session(&self) -> Arc<dyn ToolProvider> {
        Arc::clone(&self.session) as Arc<dyn ToolProvider>
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let name = self.session.server_name.clone();
        self.service
            .cancel()
            .await
            .map_err(|e| Error::Mcp(format!("error cancelling MCP server '{name}': {e}")))?;
        Ok(())
    }
}

/// Tool provider backed by an MCP peer.
pub struct McpSession {
    server_name: String,
    peer: Peer<RoleClient>,
    call_timeout: Duration,
}

#[async_trait]
impl ToolProvider for McpSession {
    fn name(&self) -> &str {
        &self.server_name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let tools = self.peer.list_all_tools().await.map_err(|e| {
            Error::Mcp(format!(
                "failed to list tools from '{}': {}",
                self.server_name,
                root_cause(&e)
            ))
        })?;

        Ok(tools
            .into_iter()
            .map(|t| ToolDefinition {
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()).unwrap_or_default(),
                input_schema: serde_json::to_value(&*t.input_schema).unwrap_or_default(),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, input: serde_json::Value) -> Result<Vec<ToolContent>> {
        let arguments = match input {
            serde_json::Value::Object(map) => Some(map),
            serde_json::Value::Null => None,
            other => {
                return Err(Error::Tool(format!(
                    "arguments must be a JSON object, got {other}"
                )));
            }
        };
        let params = CallToolRequestParams {
            meta: None,
            name: name.to_string().into(),
            arguments,
            task: None,
        };

        let result = tokio::time::timeout(self.call_timeout, self.peer.call_tool(params))
            .await
            .map_err(|_| {
                Error::Tool(format!(
                    "'{name}' timed out after {}s",
                    self.call_timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::Tool(root_cause(&e)))?;

        let (content, is_error) = parse_call_result(&result);
        if is_error {
            return Err(Error::Tool(join_text(&content)));
        }
        Ok(content)
    }
}

/// Text items verbatim, anything else by its content kind.
fn parse_call_result(result: &CallToolResult) -> (Vec<ToolContent>, bool) {
    let content = result
        .content
        .iter()
        .map(|item| match &item.raw {
            RawContent::Text(text) => ToolContent::Text(text.text.clone()),
            RawContent::Image(_) => ToolContent::Other("image".into()),
            RawContent::Audio(_) => ToolContent::Other("audio".into()),
            RawContent::Resource(_) => ToolContent::Other("resource".into()),
            RawContent::ResourceLink(_) => ToolContent::Other("resource_link".into()),
        })
        .collect();
    (content, result.is_error.unwrap_or(false))
}
