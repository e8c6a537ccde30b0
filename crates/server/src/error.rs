//! Unified error handling for the API — maps `CoreError` and request-body
//! validation failures onto the status codes §6/§7 specify.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use conduit_core::CoreError;
use serde::Serialize;

#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        (
            status,
            Json(ApiError {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::EmptyPrompt | CoreError::EmptyRequesterId | CoreError::ValidationError { .. } => {
                AppError::BadRequest(err.to_string())
            }
            CoreError::UnknownTask(_) | CoreError::UnknownApproval(_) | CoreError::UnknownTool(_) => {
                AppError::NotFound(err.to_string())
            }
            CoreError::TaskNotRunning(_) => AppError::BadRequest(err.to_string()),
            CoreError::SchemaError { .. } | CoreError::Other(_) => {
                tracing::error!(error = %err, "internal error");
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", err);
        AppError::Internal(err.to_string())
    }
}
