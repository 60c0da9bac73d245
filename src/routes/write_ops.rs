//! Write-operation routes (spec.md §4.15, §6). `Authorization: Bearer`
//! carries the caller's own GitHub OAuth token — this crate trusts it as
//! an external boolean oracle, same as the rest of the read surface.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::models::{ApiResponse, SubmitWriteOperation, WriteOperation};
use crate::state::AppState;
use crate::write_ops;

fn bearer_token(headers: &HeaderMap) -> AppResult<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .ok_or(AppError::NotAuthenticated)
}

pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(dto): Json<SubmitWriteOperation>,
) -> AppResult<Json<ApiResponse<WriteOperation>>> {
    let token = bearer_token(&headers)?;
    let op = write_ops::submit(&state.pool, token, dto).await?;
    Ok(Json(ApiResponse::new(op)))
}

pub async fn get_by_correlation_id(
    State(state): State<AppState>,
    Path(correlation_id): Path<String>,
) -> AppResult<Json<ApiResponse<WriteOperation>>> {
    let op = write_ops::get_by_correlation_id(&state.pool, &correlation_id).await?;
    Ok(Json(ApiResponse::new(op)))
}
