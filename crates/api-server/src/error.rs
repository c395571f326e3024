//! Mapping of domain errors onto HTTP responses

use axum::{http::StatusCode, Json};
use serde::Serialize;

use agent_runner::{ErrorKind, OrchestratorError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<T, ApiError>;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn orchestrator_error(err: OrchestratorError) -> ApiError {
    let status = match err.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyBusy | ErrorKind::InvalidState => StatusCode::CONFLICT,
        ErrorKind::Spawn | ErrorKind::Io | ErrorKind::Internal => {
            tracing::error!("Orchestration failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, err.to_string())
}

pub fn store_error(err: boss_core::Error) -> ApiError {
    let status = match &err {
        boss_core::Error::WorkItemNotFound(_) => StatusCode::NOT_FOUND,
        boss_core::Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        boss_core::Error::Io(_) | boss_core::Error::Serialization(_) => {
            tracing::error!("Work item store failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, err.to_string())
}
