use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::handlers::{build_router, AppState};

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
}

/// The ingestion HTTP server, packaged as a runner process.
pub struct IngestionApi {
    state: AppState,
    config: HttpServerConfig,
}

impl IngestionApi {
    pub fn new(state: AppState, config: HttpServerConfig) -> Self {
        debug!("Initializing ingestion API module");
        Self { state, config }
    }

    pub fn into_runner_process(
        self,
    ) -> impl FnOnce(
        CancellationToken,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
    > {
        move |ctx| Box::pin(async move { run_http_server(self.config, self.state, ctx).await })
    }
}

async fn run_http_server(
    config: HttpServerConfig,
    state: AppState,
    ctx: CancellationToken,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind ingestion API to {}", addr))?;

    info!(addr = %addr, "Ingestion API listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { ctx.cancelled().await })
        .await
        .context("Ingestion API server error")?;

    info!("Ingestion API shut down gracefully");
    Ok(())
}
