//! Crate-wide error type for the HTTP boundary.
//!
//! Internal engine code (processor, handlers, fetchers) returns
//! `anyhow::Result` like the teacher's `github/*.rs` — an unparseable
//! payload or a transient I/O failure there is just "this delivery
//! failed", with no caller that needs to branch on the cause. The read
//! and write routes DO need to branch (404 vs 401 vs 403 vs 500), so they
//! return `AppError`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("github api error: {0}")]
    GitHub(#[from] octocrab::Error),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("insufficient permission")]
    InsufficientPermission,

    #[error("entity not found")]
    EntityNotFound,

    #[error("repository not found on github")]
    RepoNotFoundOnGitHub,

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("database error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            AppError::GitHub(e) => {
                tracing::error!("github api error: {e}");
                (StatusCode::BAD_GATEWAY, "github api error".to_string())
            }
            AppError::NotAuthenticated => {
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            AppError::InsufficientPermission => {
                (StatusCode::FORBIDDEN, self.to_string())
            }
            AppError::EntityNotFound | AppError::RepoNotFoundOnGitHub => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Other(e) => {
                tracing::error!("unhandled error: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
