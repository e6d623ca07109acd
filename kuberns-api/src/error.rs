use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kuberns_common::ValidationError;
use kuberns_orchestrator::OrchestratorError;
use serde_json::json;

/// Maps orchestrator errors onto HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub OrchestratorError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        ApiError(e)
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError(OrchestratorError::Validation(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.0.to_string();
        match self.0 {
            OrchestratorError::NotFound { .. } => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": message })),
            )
                .into_response(),
            OrchestratorError::Validation(v) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": v.message, "field": v.field })),
            )
                .into_response(),
            _ => {
                tracing::error!(error = %message, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": message })),
                )
                    .into_response()
            }
        }
    }
}
