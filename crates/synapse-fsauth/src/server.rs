//! Axum HTTP server exposing the filesystem authority's two tools.
//!
//! # Endpoints
//!
//! | Method | Path                  | Description                              |
//! |--------|-----------------------|-------------------------------------------|
//! | `GET`  | `/health`             | Liveness check.                           |
//! | `POST` | `/tools/save_file`    | Write content to an allow-listed path.    |
//! | `POST` | `/tools/validate_path`| Check whether a path is allow-listed.     |
//! | `GET`  | `/allowed_roots`      | List the configured allow-list roots.     |

use crate::error::{FsAuthError, FsAuthResult};
use crate::path::{is_path_allowed, resolve_weak};
use crate::state::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use tracing::{info, warn};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tools/save_file", post(save_file))
        .route("/tools/validate_path", post(validate_path))
        .route("/allowed_roots", get(allowed_roots))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "filesystem",
        "timestamp": Utc::now().timestamp(),
        "allowed_roots": state.allowed_roots.iter().map(|r| r.display().to_string()).collect::<Vec<_>>(),
    }))
}

#[derive(Deserialize)]
struct SaveFileParams {
    file_path: String,
    content: String,
}

#[derive(Serialize)]
struct SaveFileResponse {
    success: bool,
    file_path: String,
    bytes_written: u64,
}

async fn save_file(State(state): State<AppState>, Json(params): Json<SaveFileParams>) -> FsAuthResult<Json<SaveFileResponse>> {
    info!(file_path = params.file_path, "attempting to save file");

    let target = Path::new(&params.file_path);
    if !is_path_allowed(target, &state.allowed_roots) {
        warn!(file_path = params.file_path, "security violation: path outside allow-list");
        return Err(FsAuthError::PathDisallowed(params.file_path));
    }

    let resolved = resolve_weak(target).map_err(|e| FsAuthError::WriteFailed(e.to_string()))?;

    if let Some(parent) = resolved.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| FsAuthError::WriteFailed(e.to_string()))?;
    }
    tokio::fs::write(&resolved, &params.content).await.map_err(|e| FsAuthError::WriteFailed(e.to_string()))?;

    let bytes_written = params.content.len() as u64;
    info!(file_path = %resolved.display(), bytes_written, "file saved successfully");

    Ok(Json(SaveFileResponse {
        success: true,
        file_path: resolved.display().to_string(),
        bytes_written,
    }))
}

#[derive(Deserialize)]
struct PathValidationRequest {
    path: String,
}

#[derive(Serialize)]
struct PathValidationResponse {
    path: String,
    is_allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved_path: Option<String>,
}

async fn validate_path(State(state): State<AppState>, Json(request): Json<PathValidationRequest>) -> Json<PathValidationResponse> {
    let candidate = Path::new(&request.path);
    let is_allowed = is_path_allowed(candidate, &state.allowed_roots);
    let resolved_path = if is_allowed {
        resolve_weak(candidate).ok().map(|p| p.display().to_string())
    } else {
        None
    };

    Json(PathValidationResponse {
        path: request.path,
        is_allowed,
        resolved_path,
    })
}

async fn allowed_roots(State(state): State<AppState>) -> Json<Value> {
    let roots: Vec<String> = state.allowed_roots.iter().map(|r| r.display().to_string()).collect();
    Json(json!({ "allowed_roots": roots, "total_roots": roots.len() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state(root: std::path::PathBuf) -> AppState {
        AppState::new(vec![root])
    }

    #[tokio::test]
    async fn health_reports_status_ok() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(test_state(dir.path().to_path_buf()));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn save_file_rejects_path_outside_allow_list() {
        let dir = tempfile::tempdir().unwrap();
        let root = crate::path::canonicalize_root(&dir.path().join("output")).unwrap();
        let app = router(test_state(root));

        let body = json!({ "file_path": "/etc/passwd", "content": "x" }).to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tools/save_file")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn save_file_writes_allowed_path_and_reports_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let root = crate::path::canonicalize_root(&dir.path().join("output")).unwrap();
        let app = router(test_state(root.clone()));

        let target = root.join("report.md");
        let body = json!({ "file_path": target.display().to_string(), "content": "hello" }).to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/tools/save_file")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(target.exists());
    }
}
