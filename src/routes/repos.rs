//! Read routes over repository projections (spec.md §4.18, §6).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::models::ApiResponse;
use crate::queries;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub cursor: Option<chrono::DateTime<chrono::Utc>>,
    pub limit: Option<i64>,
}

pub async fn list_repos(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Vec<crate::models::RepoOverview>>>> {
    let repos = queries::list_repos(&state.pool).await?;
    Ok(Json(ApiResponse::new(repos)))
}

pub async fn repo_overview(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<crate::models::RepoOverview>>> {
    let overview = queries::repo_overview(&state.pool, &owner, &repo).await?;
    Ok(Json(ApiResponse::new(overview)))
}

pub async fn list_pulls(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<ApiResponse<crate::models::Page<crate::models::RepoPullRequestListItem>>>> {
    let repository_id = queries::repository_id_for(&state.pool, &owner, &repo).await?;
    let page = queries::list_pull_requests(&state.pool, repository_id, params.cursor, params.limit.unwrap_or(50)).await?;
    Ok(Json(ApiResponse::new(page)))
}

pub async fn pull_request_detail(
    State(state): State<AppState>,
    Path((owner, repo, number)): Path<(String, String, i32)>,
) -> AppResult<Json<ApiResponse<queries::PullRequestDetail>>> {
    let repository_id = queries::repository_id_for(&state.pool, &owner, &repo).await?;
    let detail = match queries::pr_detail(&state.pool, repository_id, number).await {
        Ok(detail) => detail,
        Err(crate::error::AppError::EntityNotFound) => {
            let rest = installation_rest_client(&state, repository_id).await?;
            crate::ondemand::sync_pull_request(&state.pool, &rest, &owner, &repo, number).await?;
            queries::pr_detail(&state.pool, repository_id, number).await?
        }
        Err(other) => return Err(other),
    };
    Ok(Json(ApiResponse::new(detail)))
}

pub async fn list_issues(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<ApiResponse<crate::models::Page<crate::models::RepoIssueListItem>>>> {
    let repository_id = queries::repository_id_for(&state.pool, &owner, &repo).await?;
    let page = queries::list_issues(&state.pool, repository_id, params.cursor, params.limit.unwrap_or(50)).await?;
    Ok(Json(ApiResponse::new(page)))
}

pub async fn issue_detail(
    State(state): State<AppState>,
    Path((owner, repo, number)): Path<(String, String, i32)>,
) -> AppResult<Json<ApiResponse<queries::IssueDetail>>> {
    let repository_id = queries::repository_id_for(&state.pool, &owner, &repo).await?;
    let detail = match queries::issue_detail(&state.pool, repository_id, number).await {
        Ok(detail) => detail,
        Err(crate::error::AppError::EntityNotFound) => {
            let rest = installation_rest_client(&state, repository_id).await?;
            crate::ondemand::sync_issue(&state.pool, &rest, &owner, &repo, number).await?;
            queries::issue_detail(&state.pool, repository_id, number).await?
        }
        Err(other) => return Err(other),
    };
    Ok(Json(ApiResponse::new(detail)))
}

pub async fn list_activity(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<ApiResponse<crate::models::Page<crate::models::ActivityEntry>>>> {
    let repository_id = queries::repository_id_for(&state.pool, &owner, &repo).await?;
    let page = queries::list_activity(&state.pool, repository_id, params.cursor, params.limit.unwrap_or(50)).await?;
    Ok(Json(ApiResponse::new(page)))
}

pub async fn reconcile(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
) -> AppResult<Json<ApiResponse<crate::ops::ReconcileResult>>> {
    let result = crate::ops::reconcile_repo(&state.pool, &owner, &repo).await?;
    Ok(Json(ApiResponse::new(result)))
}

async fn installation_rest_client(
    state: &AppState,
    repository_id: i64,
) -> AppResult<crate::github::RestClient> {
    let installation_id: i64 = sqlx::query_scalar(
        "SELECT installation_id FROM repositories WHERE repository_id = $1",
    )
    .bind(repository_id)
    .fetch_one(&state.pool)
    .await?;

    let token = state.github.token_for_installation(installation_id as u64).await?;

    Ok(crate::github::RestClient::new(token))
}
