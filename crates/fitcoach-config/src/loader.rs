use std::path::{Path, PathBuf};

use fitcoach_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const DEFAULT_CONFIG_FILE: &str = "fitcoach.yaml";

/// Loads `AppConfig` from YAML, then layers environment overrides on top.
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    /// `None` looks for `fitcoach.yaml` in the working directory and falls
    /// back to defaults when it is absent. An explicit path must exist.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Result<AppConfig> {
        if dotenvy::dotenv().is_ok() {
            debug!("loaded environment from .env");
        }

        let mut config = match &self.path {
            Some(path) => Self::read_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::read_file(default_path)?
                } else {
                    info!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                    AppConfig::default()
                }
            }
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        validate(&config)?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<AppConfig> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = parse_yaml(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }
}

pub fn parse_yaml(raw: &str) -> Result<AppConfig> {
    if raw.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    serde_yaml::from_str(raw).map_err(|e| Error::Config(format!("invalid YAML: {e}")))
}

/// Apply environment overrides using `lookup` as the variable source.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if config.llm.api_key.is_none() {
        config.llm.api_key = non_empty("ANTHROPIC_API_KEY");
    }
    if let Some(url) = non_empty("ANTHROPIC_BASE_URL") {
        config.llm.base_url = url;
    }
    if let Some(model) = non_empty("FITCOACH_MODEL") {
        config.llm.model = model;
    }
    if let Some(host) = non_empty("FITCOACH_HOST") {
        config.gateway.host = host;
    }
    if let Some(port) = non_empty("FITCOACH_PORT").and_then(|p| p.parse().ok()) {
        config.gateway.port = port;
    }
}

pub fn validate(config: &AppConfig) -> Result<()> {
    if config.llm.model.trim().is_empty() {
        return Err(Error::Config("llm.model must not be empty".into()));
    }
    if config.llm.max_tokens == 0 {
        return Err(Error::Config("llm.max_tokens must be greater than 0".into()));
    }
    if config.agent.max_tool_rounds == 0 {
        return Err(Error::Config(
            "agent.max_tool_rounds must be greater than 0".into(),
        ));
    }
    if config.mcp.startup_timeout_secs == 0 || config.mcp.tool_timeout_secs == 0 {
        return Err(Error::Config("mcp timeouts must be greater than 0".into()));
    }
    for (name, server) in &config.mcp.servers {
        if server.command.trim().is_empty() {
            return Err(Error::Config(format!(
                "mcp server '{name}' has an empty command"
            )));
        }
    }
    Ok(())
}

impl AppConfig {
    /// The Anthropic API key, required before serving traffic.
    pub fn require_api_key(&self) -> Result<&str> {
        self.llm
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("ANTHROPIC_API_KEY not set".to_string()))
    }
}
