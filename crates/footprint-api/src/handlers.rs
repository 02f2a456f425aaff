use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use footprint_domain::{IngestionService, ReadinessProbe, TrackEventRequest};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionService>,
    pub readiness: Arc<dyn ReadinessProbe>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/events/track", post(track_event))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Accept one activity event. A 202 promises durable enqueue, not
/// persistence; the caller waits on the broker ack only.
async fn track_event(
    State(state): State<AppState>,
    payload: Result<Json<TrackEventRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;

    let event = state.ingestion.ingest(request).await?;

    info!(
        user_id = event.user_id,
        event_type = %event.event_type,
        "Event accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "message": "Event queued for processing",
        })),
    ))
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.readiness.is_ready() {
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
    use axum::http::{header, Request};
    use footprint_domain::{DomainError, MockActivityEventProducer};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn router_with(producer: MockActivityEventProducer, ready: bool) -> Router {
        let state = AppState {
            ingestion: Arc::new(IngestionService::new(Arc::new(producer))),
            readiness: Arc::new(AtomicBool::new(ready)),
        };
        build_router(state)
    }

    fn track_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/events/track")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_valid_event_accepted() {
        let mut producer = MockActivityEventProducer::new();
        producer.expect_publish().times(1).return_once(|_| Ok(()));

        let response = router_with(producer, true)
            .oneshot(track_request(
                r#"{"user_id": 123, "event_type": "page_view",
                    "timestamp": "2026-02-20T10:00:00Z",
                    "metadata": {"device": "mobile"}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "accepted");
        assert_eq!(body["message"], "Event queued for processing");
    }

    #[tokio::test]
    async fn test_invalid_user_id_rejected_without_publish() {
        // Mock with no expectations: any publish call fails the test.
        let producer = MockActivityEventProducer::new();

        let response = router_with(producer, true)
            .oneshot(track_request(
                r#"{"user_id": -1, "event_type": "login",
                    "timestamp": "2026-02-20T10:00:00Z"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Invalid UserActivityEvent payload");
        assert_eq!(body["detail"][0]["field"], "user_id");
    }

    #[tokio::test]
    async fn test_undecodable_body_rejected() {
        let producer = MockActivityEventProducer::new();

        let response = router_with(producer, true)
            .oneshot(track_request("{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["detail"][0]["field"], "body");
    }

    #[tokio::test]
    async fn test_broker_failure_maps_to_500() {
        let mut producer = MockActivityEventProducer::new();
        producer.expect_publish().times(1).return_once(|_| {
            Err(DomainError::BrokerUnavailable(anyhow::anyhow!(
                "connection refused"
            )))
        });

        let response = router_with(producer, true)
            .oneshot(track_request(
                r#"{"user_id": 7, "event_type": "login",
                    "timestamp": "2026-02-20T10:00:00Z"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["detail"], "Internal Broker Error");
    }

    #[tokio::test]
    async fn test_health_reflects_readiness() {
        let health = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = router_with(MockActivityEventProducer::new(), true)
            .oneshot(health)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let health = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = router_with(MockActivityEventProducer::new(), false)
            .oneshot(health)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
