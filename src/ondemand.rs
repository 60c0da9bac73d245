//! On-demand sync (spec.md §4.16): gap-fill for deep-linked PR/issue pages
//! that have no local row yet.

use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::github::rest::RestClient;
use crate::handlers::common::upsert_user;
use crate::pr_files::{self, SyncTarget};
use crate::projections;

async fn ensure_repository(pool: &PgPool, rest: &RestClient, owner: &str, name: &str) -> AppResult<i64> {
    if let Some(id) = sqlx::query_scalar::<_, i64>(
        "SELECT repository_id FROM repositories WHERE owner_login = $1 AND name = $2",
    )
    .bind(owner)
    .bind(name)
    .fetch_optional(pool)
    .await?
    {
        return Ok(id);
    }

    let (body, _) = rest
        .get(&RestClient::base_url(&format!("/repos/{owner}/{name}")))
        .await
        .map_err(|e| match e {
            crate::github::rest::RestError::Http { status: 404, .. } => AppError::RepoNotFoundOnGitHub,
            other => AppError::Other(anyhow::anyhow!(other.to_string())),
        })?;

    let repository_id = body["id"].as_i64().ok_or(AppError::RepoNotFoundOnGitHub)?;
    sqlx::query(
        r#"INSERT INTO repositories
             (id, repository_id, installation_id, owner_login, name, full_name,
              visibility, default_branch, archived, disabled, is_fork, pushed_at,
              github_updated_at, created_at, updated_at)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now(), now())
           ON CONFLICT (repository_id) DO NOTHING"#,
    )
    .bind(repository_id)
    .bind(body["owner"]["id"].as_i64().unwrap_or(0))
    .bind(owner)
    .bind(name)
    .bind(body["full_name"].as_str().unwrap_or(""))
    .bind(if body["private"].as_bool().unwrap_or(false) { "private" } else { "public" })
    .bind(body["default_branch"].as_str().unwrap_or("main"))
    .bind(body["archived"].as_bool().unwrap_or(false))
    .bind(body["disabled"].as_bool().unwrap_or(false))
    .bind(body["fork"].as_bool().unwrap_or(false))
    .bind(body["pushed_at"].as_str().and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()).map(|d| d.with_timezone(&chrono::Utc)))
    .bind(body["updated_at"].as_str().and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()).map(|d| d.with_timezone(&chrono::Utc)))
    .execute(pool)
    .await?;

    Ok(repository_id)
}

pub async fn sync_pull_request(pool: &PgPool, rest: &RestClient, owner: &str, name: &str, number: i32) -> AppResult<i64> {
    let repository_id = ensure_repository(pool, rest, owner, name).await?;

    if sqlx::query_scalar::<_, i32>(
        "SELECT 1 FROM pull_requests WHERE repository_id = $1 AND number = $2",
    )
    .bind(repository_id)
    .bind(number)
    .fetch_optional(pool)
    .await?
    .is_some()
    {
        return Ok(repository_id);
    }

    let (pr, _) = rest
        .get(&RestClient::base_url(&format!("/repos/{owner}/{name}/pulls/{number}")))
        .await
        .map_err(|e| AppError::Other(anyhow::anyhow!(e.to_string())))?;

    upsert_user(pool, &pr["user"]).await?;
    crate::bootstrap::upsert_pull_request(pool, repository_id, &pr).await?;

    let comments = rest
        .get_all_pages(&format!("/repos/{owner}/{name}/issues/{number}/comments"), 100, 500)
        .await
        .unwrap_or_default();
    for c in &comments {
        upsert_user(pool, &c["user"]).await?;
        crate::handlers::issue_comment::upsert_from_rest(pool, repository_id, number, c).await?;
    }

    let reviews = rest
        .get_all_pages(&format!("/repos/{owner}/{name}/pulls/{number}/reviews"), 100, 200)
        .await
        .unwrap_or_default();
    for r in &reviews {
        upsert_user(pool, &r["user"]).await?;
        crate::handlers::pull_request_review::upsert_from_rest(pool, repository_id, number, r).await?;
    }

    let head_sha = pr["head"]["sha"].as_str().unwrap_or("").to_string();
    if !head_sha.is_empty() {
        if let Ok((body, _)) = rest
            .get(&RestClient::base_url(&format!("/repos/{owner}/{name}/commits/{head_sha}/check-runs")))
            .await
        {
            for cr in body["check_runs"].as_array().cloned().unwrap_or_default() {
                crate::handlers::check_run::upsert_from_rest(pool, repository_id, &cr).await?;
            }
        }
    }

    projections::update_all_projections(pool, repository_id).await?;

    let target = SyncTarget { owner_login: owner.to_string(), name: name.to_string(), repository_id, pull_request_number: number, head_sha };
    pr_files::sync(pool, rest, &target).await;

    Ok(repository_id)
}

pub async fn sync_issue(pool: &PgPool, rest: &RestClient, owner: &str, name: &str, number: i32) -> AppResult<i64> {
    let repository_id = ensure_repository(pool, rest, owner, name).await?;

    if sqlx::query_scalar::<_, i32>(
        "SELECT 1 FROM issues WHERE repository_id = $1 AND number = $2",
    )
    .bind(repository_id)
    .bind(number)
    .fetch_optional(pool)
    .await?
    .is_some()
    {
        return Ok(repository_id);
    }

    let (issue, _) = rest
        .get(&RestClient::base_url(&format!("/repos/{owner}/{name}/issues/{number}")))
        .await
        .map_err(|e| AppError::Other(anyhow::anyhow!(e.to_string())))?;

    upsert_user(pool, &issue["user"]).await?;
    crate::bootstrap::upsert_issue(pool, repository_id, &issue).await?;

    let comments = rest
        .get_all_pages(&format!("/repos/{owner}/{name}/issues/{number}/comments"), 100, 500)
        .await
        .unwrap_or_default();
    for c in &comments {
        upsert_user(pool, &c["user"]).await?;
        crate::handlers::issue_comment::upsert_from_rest(pool, repository_id, number, c).await?;
    }

    projections::update_all_projections(pool, repository_id).await?;

    Ok(repository_id)
}
