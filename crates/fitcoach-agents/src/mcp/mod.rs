mod lifecycle;
mod session;

pub use lifecycle::{ProviderConnection, ProviderConnector, ProviderManager};
pub use session::{McpSession, StdioMcpConnector};
