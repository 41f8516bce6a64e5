pub mod mcp;
pub mod providers;
pub mod runtime;
pub mod tools;

pub use mcp::{ProviderConnection, ProviderConnector, ProviderManager, StdioMcpConnector};
pub use providers::{
    AnthropicProvider, ChatMessage, ChatRole, ContentBlock, LlmProvider, LlmRequest, LlmResponse,
    LlmStreamResponse, MessagePart, ToolDefinition,
};
pub use runtime::{AgentEvent, AgentRuntime};
pub use tools::{ToolCatalog, ToolProvider, ToolRegistry, preamble_for};
