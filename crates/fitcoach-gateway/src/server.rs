use std::sync::Arc;

use fitcoach_common::{Error, Result};
use fitcoach_config::AppConfig;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::bootstrap;
use crate::router::build_router;
use crate::state::AppState;

/// Owns the process lifetime: providers up, HTTP served, providers down.
pub struct GatewayServer {
    config: AppConfig,
}

impl GatewayServer {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        // Fail on a missing key before spawning any child processes.
        self.config.require_api_key()?;

        let mut providers = bootstrap::start_providers(&self.config).await?;
        let grace = bootstrap::shutdown_grace(&self.config);

        let served = self.serve(&providers).await;

        info!("shutting down tool providers");
        providers.shutdown(grace).await;
        served
    }

    async fn serve(&self, providers: &fitcoach_agents::ProviderManager) -> Result<()> {
        let runtime = bootstrap::build_runtime(&self.config, providers)?;
        let state = Arc::new(AppState::new(self.config.clone(), runtime));
        let app = build_router(state);

        let addr = format!("{}:{}", self.config.gateway.host, self.config.gateway.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Gateway(format!("failed to bind {addr}: {e}")))?;
        info!("fitcoach gateway listening on http://{}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Gateway(format!("server error: {e}")))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
