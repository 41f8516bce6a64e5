use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use super::ToolProvider;
use crate::providers::ToolDefinition;

/// The set of live tool provider sessions, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    providers: Vec<Arc<dyn ToolProvider>>,
}

/// A per-turn snapshot of the tool catalog: the definitions sent to the model
/// and the index used to route invocations.
#[derive(Default)]
pub struct ToolCatalog {
    pub(super) definitions: Vec<ToolDefinition>,
    pub(super) index: HashMap<String, Arc<dyn ToolProvider>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn ToolProvider>) {
        info!("registered tool provider: {}", provider.name());
        self.providers.push(provider);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Every tool from every provider, de-duplicated by name.
    pub async fn list_all_tools(&self) -> Vec<ToolDefinition> {
        self.catalog().await.definitions
    }

    /// Query all providers and build the catalog for one turn.
    ///
    /// When two providers expose the same name the later registration wins;
    /// the entry keeps the position of its first appearance.
    pub async fn catalog(&self) -> ToolCatalog {
        let listings = join_all(self.providers.iter().map(|p| p.list_tools())).await;

        let mut catalog = ToolCatalog::default();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for (provider, listing) in self.providers.iter().zip(listings) {
            let tools = match listing {
                Ok(tools) => tools,
                Err(e) => {
                    warn!("failed to list tools from '{}': {e}", provider.name());
                    continue;
                }
            };

            for tool in tools {
                match positions.get(&tool.name) {
                    Some(&pos) => {
                        warn!(
                            "tool '{}' from '{}' shadows an earlier registration",
                            tool.name,
                            provider.name()
                        );
                        catalog.definitions[pos] = tool.clone();
                    }
                    None => {
                        positions.insert(tool.name.clone(), catalog.definitions.len());
                        catalog.definitions.push(tool.clone());
                    }
                }
                catalog.index.insert(tool.name, Arc::clone(provider));
            }
        }

        catalog
    }
}

impl ToolCatalog {
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Name of the provider that owns `tool`, if any.
    pub fn owner(&self, tool: &str) -> Option<&str> {
        self.index.get(tool).map(|p| p.name())
    }
}
