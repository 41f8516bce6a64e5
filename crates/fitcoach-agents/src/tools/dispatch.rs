use tracing::{info, warn};

use super::{ToolCatalog, join_text};

impl ToolCatalog {
    /// Invoke a tool by name and return its result as text.
    ///
    /// Never fails: unknown names and provider errors become text the model
    /// can read and react to.
    pub async fn invoke(&self, name: &str, input: serde_json::Value) -> String {
        let Some(provider) = self.index.get(name) else {
            warn!(tool = name, "model requested an unknown tool");
            return format!("unknown tool: {name}");
        };

        info!(tool = name, provider = provider.name(), input = %input, "tool call");

        match provider.call_tool(name, input).await {
            Ok(content) => {
                let output = join_text(&content);
                info!(tool = name, output = %output, is_error = false, "tool result");
                output
            }
            Err(e) => {
                let output = format!("tool error: {e}");
                info!(tool = name, output = %output, is_error = true, "tool result");
                output
            }
        }
    }
}
