use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::orchestrator::OrchestratorError;

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = match &self {
            OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::NotFound { .. } => StatusCode::NOT_FOUND,
            OrchestratorError::InvalidState { .. } => StatusCode::CONFLICT,
            OrchestratorError::Authentication(_)
            | OrchestratorError::Launch(_)
            | OrchestratorError::Api(_)
            | OrchestratorError::Connection(_) => StatusCode::BAD_GATEWAY,
            OrchestratorError::Storage(e) => {
                error!(error = %e, "storage failure while serving request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
