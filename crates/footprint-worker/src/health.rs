use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use footprint_domain::ReadinessProbe;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub host: String,
    pub port: u16,
}

/// Worker-side health listener on its own port.
///
/// The worker has no request-serving surface, so readiness comes from
/// the consumer loops: healthy only while at least one loop holds a live
/// consumer on the queue.
pub async fn run_health_server(
    config: HealthServerConfig,
    readiness: Arc<dyn ReadinessProbe>,
    ctx: CancellationToken,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind worker health listener to {}", addr))?;

    info!(addr = %addr, "Worker health listener ready");

    axum::serve(listener, health_router(readiness))
        .with_graceful_shutdown(async move { ctx.cancelled().await })
        .await
        .context("Worker health listener error")?;

    Ok(())
}

fn health_router(readiness: Arc<dyn ReadinessProbe>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(readiness)
}

async fn health_check(State(readiness): State<Arc<dyn ReadinessProbe>>) -> impl IntoResponse {
    if readiness.is_ready() {
        (StatusCode::OK, Json(json!({"status": "healthy"})))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "unhealthy"})),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_follows_consumer_readiness() {
        let flag = Arc::new(AtomicBool::new(false));
        let router = health_router(flag.clone());

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        flag.store(true, Ordering::SeqCst);
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
