use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fitcoach_common::{Error, Result, root_cause};
use futures::future::join_all;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::tools::{ToolProvider, ToolRegistry};

/// Opens a connection to one tool provider.
#[async_trait]
pub trait ProviderConnector: Send + Sync {
    fn name(&self) -> &str;

    /// Open the transport and complete the protocol handshake.
    async fn connect(&self) -> Result<Box<dyn ProviderConnection>>;
}

/// An open provider connection, owned by its background task.
#[async_trait]
pub trait ProviderConnection: Send {
    fn session(&self) -> Arc<dyn ToolProvider>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// A provider that reached readiness.
struct RunningProvider {
    name: String,
    session: Arc<dyn ToolProvider>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

/// Starts tool providers as background tasks and tears them down on shutdown.
pub struct ProviderManager {
    providers: Vec<RunningProvider>,
}

impl ProviderManager {
    /// A manager with no providers; tool use stays disabled.
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Start every connector and wait for all of them to become ready.
    ///
    /// Any failure is fatal: the providers that did start are shut down and a
    /// single `Error::Startup` lists every provider that failed.
    pub async fn start_all(
        connectors: Vec<Arc<dyn ProviderConnector>>,
        startup_timeout: Duration,
    ) -> Result<Self> {
        let results = join_all(
            connectors
                .into_iter()
                .map(|c| start_provider(c, startup_timeout)),
        )
        .await;

        let mut started = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(provider) => started.push(provider),
                Err(failure) => failures.push(failure),
            }
        }

        let mut manager = Self { providers: started };
        if failures.is_empty() {
            return Ok(manager);
        }

        manager.shutdown(Duration::from_secs(1)).await;
        Err(Error::Startup(failures.join("; ")))
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name.clone()).collect()
    }

    /// A registry over every ready provider session.
    pub fn registry(&self) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for provider in &self.providers {
            registry.register(Arc::clone(&provider.session));
        }
        registry
    }

    /// Signal every provider to stop and wait up to `grace` for each; tasks
    /// still running after that are aborted.
    pub async fn shutdown(&mut self, grace: Duration) {
        let providers = std::mem::take(&mut self.providers);
        join_all(providers.into_iter().map(|p| stop_provider(p, grace))).await;
    }
}

async fn start_provider(
    connector: Arc<dyn ProviderConnector>,
    startup_timeout: Duration,
) -> std::result::Result<RunningProvider, String> {
    let name = connector.name().to_string();
    let (ready_tx, ready_rx) = oneshot::channel::<Arc<dyn ToolProvider>>();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let task_name = name.clone();
    let mut task = tokio::spawn(async move {
        let connection = connector.connect().await?;
        let session = connection.session();
        let tools = session.list_tools().await?;
        info!(
            "tool provider '{task_name}' ready: {} tool(s) discovered",
            tools.len()
        );
        for tool in &tools {
            info!("  -> {task_name}.{}", tool.name);
        }

        if ready_tx.send(session).is_ok() {
            // A dropped sender also counts as a stop signal.
            let _ = stop_rx.await;
        }
        connection.close().await
    });

    match tokio::time::timeout(startup_timeout, ready_rx).await {
        Ok(Ok(session)) => Ok(RunningProvider {
            name,
            session,
            stop_tx: Some(stop_tx),
            task,
        }),
        Ok(Err(_)) => {
            let cause = match (&mut task).await {
                Ok(Err(e)) => root_cause(&e),
                Ok(Ok(())) => "exited before becoming ready".to_string(),
                Err(e) => format!("task failed: {e}"),
            };
            warn!("tool provider '{name}' failed to start: {cause}");
            Err(format!("'{name}': {cause}"))
        }
        Err(_) => {
            task.abort();
            warn!(
                "tool provider '{name}' not ready after {}s, cancelled",
                startup_timeout.as_secs_f32()
            );
            Err(format!(
                "'{name}': not ready within {}s",
                startup_timeout.as_secs_f32()
            ))
        }
    }
}

async fn stop_provider(mut provider: RunningProvider, grace: Duration) {
    let name = provider.name.clone();
    info!("stopping tool provider '{name}'");
    if let Some(stop_tx) = provider.stop_tx.take() {
        let _ = stop_tx.send(());
    }

    match tokio::time::timeout(grace, &mut provider.task).await {
        Ok(Ok(Ok(()))) => info!("tool provider '{name}' stopped"),
        Ok(Ok(Err(e))) => warn!("tool provider '{name}' stopped with error: {e}"),
        Ok(Err(e)) => warn!("tool provider '{name}' task failed: {e}"),
        Err(_) => {
            warn!(
                "tool provider '{name}' did not stop within {}s, aborting",
                grace.as_secs_f32()
            );
            provider.task.abort();
        }
    }
}
