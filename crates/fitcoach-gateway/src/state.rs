use std::sync::Arc;

use fitcoach_agents::AgentRuntime;
use fitcoach_config::AppConfig;

/// Shared state handed to every request handler.
pub struct AppState {
    pub config: AppConfig,
    pub runtime: Arc<AgentRuntime>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: AppConfig, runtime: AgentRuntime) -> Self {
        Self {
            config,
            runtime: Arc::new(runtime),
        }
    }
}
