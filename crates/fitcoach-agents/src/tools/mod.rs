use async_trait::async_trait;
use fitcoach_common::Result;

use crate::providers::ToolDefinition;

mod dispatch;
pub mod preamble;
mod registry;

pub use preamble::preamble_for;
pub use registry::{ToolCatalog, ToolRegistry};

/// One item of a tool provider's call result.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolContent {
    Text(String),
    /// Non-text content (images, embedded resources); carries the kind only.
    Other(String),
}

/// A live connection to one external tool source.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Provider name, used in logs.
    fn name(&self) -> &str;

    /// The tools this provider currently exposes.
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>>;

    /// Invoke `name` with `input`. Errors are turned into text by the dispatcher.
    async fn call_tool(&self, name: &str, input: serde_json::Value) -> Result<Vec<ToolContent>>;
}

/// Join the text items of a call result with newlines.
pub fn join_text(content: &[ToolContent]) -> String {
    content
        .iter()
        .filter_map(|item| match item {
            ToolContent::Text(text) => Some(text.as_str()),
            ToolContent::Other(_) => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
