pub mod loader;
pub mod model;

pub use loader::ConfigLoader;
pub use model::{AgentConfig, AppConfig, GatewayConfig, LlmConfig, McpConfig, McpServerConfig};
