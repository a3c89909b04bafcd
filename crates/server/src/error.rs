use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orchestrator::OrchestratorError;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Internal(String),
    Database(db::DbError),
    Orchestrator(OrchestratorError),
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

fn orchestrator_status(err: &OrchestratorError) -> StatusCode {
    match err {
        OrchestratorError::Validation(_) | OrchestratorError::AlreadyInstalled(_) => {
            StatusCode::BAD_REQUEST
        }
        OrchestratorError::UnknownApp(_)
        | OrchestratorError::NotFoundOnHost(_)
        | OrchestratorError::RecordNotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::InstallInProgress(_) => StatusCode::CONFLICT,
        OrchestratorError::PermissionDenied(_)
        | OrchestratorError::Timeout(_)
        | OrchestratorError::VerificationFailed(_)
        | OrchestratorError::InvalidTransition { .. }
        | OrchestratorError::Adapter(_)
        | OrchestratorError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error occurred".to_string(),
                )
            }
            AppError::Orchestrator(OrchestratorError::Database(err)) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error occurred".to_string(),
                )
            }
            AppError::Orchestrator(err) => {
                let status = orchestrator_status(&err);
                if status.is_server_error() {
                    tracing::error!("Request failed: {}", err);
                }
                (status, err.kind(), err.to_string())
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<db::DbError> for AppError {
    fn from(err: db::DbError) -> Self {
        AppError::Database(err)
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        AppError::Orchestrator(err)
    }
}
