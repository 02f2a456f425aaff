use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use footprint_domain::{DomainError, ValidationError};
use serde_json::json;
use tracing::error;

/// Ingestion endpoint failure, shaped for the HTTP boundary.
pub enum ApiError {
    /// Client-caused: named field checks failed, nothing was enqueued
    Invalid(Vec<ValidationError>),
    /// The request body was not decodable as the expected JSON shape
    Undecodable(String),
    /// Infrastructure-caused: the durable enqueue could not be confirmed
    BrokerUnavailable,
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Invalid(errors) => {
                let detail: Vec<_> = errors
                    .iter()
                    .map(|e| json!({"field": e.field, "message": e.message}))
                    .collect();
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "detail": detail,
                        "message": "Invalid UserActivityEvent payload",
                    })),
                )
                    .into_response()
            }
            ApiError::Undecodable(detail) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "detail": [{"field": "body", "message": detail}],
                    "message": "Invalid UserActivityEvent payload",
                })),
            )
                .into_response(),
            ApiError::BrokerUnavailable => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "Internal Broker Error"})),
            )
                .into_response(),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "Internal Server Error"})),
            )
                .into_response(),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(validation) => ApiError::Invalid(vec![validation]),
            DomainError::BrokerUnavailable(source) => {
                error!(error = %source, "Broker unavailable during enqueue");
                ApiError::BrokerUnavailable
            }
            other => {
                error!(error = %other, "Unexpected ingestion failure");
                ApiError::Internal
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Undecodable(rejection.body_text())
    }
}
