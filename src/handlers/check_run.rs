//! Handler: `check_run` events (spec.md §4.8).

use sqlx::PgPool;

use super::common::parse_ts;

pub async fn handle(pool: &PgPool, repository_id: i64, payload: &serde_json::Value) -> anyhow::Result<()> {
    upsert_from_rest(pool, repository_id, &payload["check_run"]).await
}

/// Upsert one check-run row directly from a GitHub REST/webhook check_run
/// object. Used by the webhook handler above, bootstrap (spec.md §4.13),
/// and on-demand sync (spec.md §4.16).
pub async fn upsert_from_rest(pool: &PgPool, repository_id: i64, check_run: &serde_json::Value) -> anyhow::Result<()> {
    let Some(github_check_run_id) = check_run["id"].as_i64() else {
        return Ok(());
    };
    let name = check_run["name"].as_str().unwrap_or("");
    let head_sha = check_run["head_sha"].as_str().unwrap_or("");
    if name.is_empty() || head_sha.is_empty() {
        tracing::debug!(repository_id, "check_run missing name/head_sha, dropping");
        return Ok(());
    }

    let status = check_run["status"].as_str().unwrap_or("queued");
    let conclusion = check_run["conclusion"].as_str();
    let started_at = parse_ts(check_run["started_at"].as_str());
    let completed_at = parse_ts(check_run["completed_at"].as_str());

    sqlx::query(
        r#"INSERT INTO check_runs
             (id, repository_id, github_check_run_id, name, head_sha, status,
              conclusion, started_at, completed_at)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8)
           ON CONFLICT (repository_id, github_check_run_id) DO UPDATE SET
             name = excluded.name,
             head_sha = excluded.head_sha,
             status = excluded.status,
             conclusion = excluded.conclusion,
             started_at = excluded.started_at,
             completed_at = excluded.completed_at,
             updated_at = now()"#,
    )
    .bind(repository_id)
    .bind(github_check_run_id)
    .bind(name)
    .bind(head_sha)
    .bind(status)
    .bind(conclusion)
    .bind(started_at)
    .bind(completed_at)
    .execute(pool)
    .await?;

    Ok(())
}
