//! Delivery operator routes (spec.md §4.17, §6): replay a single delivery
//! or retry the whole backlog of `retry`-state rows on demand.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::models::ApiResponse;
use crate::ops;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RetryFailedParams {
    pub limit: Option<i64>,
}

pub async fn replay(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    ops::replay_delivery(&state.pool, &delivery_id).await?;
    Ok(Json(ApiResponse::new(serde_json::json!({ "replayed": true }))))
}

pub async fn retry_failed(
    State(state): State<AppState>,
    Json(params): Json<RetryFailedParams>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let count = ops::retry_all_failed(&state.pool, params.limit.unwrap_or(100)).await?;
    Ok(Json(ApiResponse::new(serde_json::json!({ "requeued": count }))))
}
