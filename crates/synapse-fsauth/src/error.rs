//! Filesystem authority error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsAuthError {
    #[error("path not allowed: {0}")]
    PathDisallowed(String),

    #[error("failed to write file: {0}")]
    WriteFailed(String),
}

impl IntoResponse for FsAuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            FsAuthError::PathDisallowed(path) => (
                StatusCode::FORBIDDEN,
                "PATH_DISALLOWED",
                format!("Access denied: '{path}' is outside allowed roots"),
            ),
            FsAuthError::WriteFailed(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "WRITE_FAILED", msg.clone()),
        };

        let body = Json(json!({ "detail": message, "code": code }));
        (status, body).into_response()
    }
}

pub type FsAuthResult<T> = Result<T, FsAuthError>;
