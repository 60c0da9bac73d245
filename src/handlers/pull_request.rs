//! Handler: `pull_request` events (spec.md §4.4).

use sqlx::PgPool;

use super::common::{parse_ts, upsert_user};

pub async fn handle(pool: &PgPool, repository_id: i64, payload: &serde_json::Value) -> anyhow::Result<()> {
    let pr = &payload["pull_request"];

    let Some(number) = pr["number"].as_i64() else {
        tracing::debug!(repository_id, "pull_request event missing number, dropping");
        return Ok(());
    };
    let Some(github_pr_id) = pr["id"].as_i64() else {
        return Ok(());
    };
    let head_sha = pr["head"]["sha"].as_str().unwrap_or("");
    if head_sha.is_empty() {
        tracing::debug!(repository_id, number, "pull_request missing head.sha, dropping");
        return Ok(());
    }
    let Some(github_updated_at) = parse_ts(pr["updated_at"].as_str()) else {
        tracing::debug!(repository_id, number, "pull_request missing updated_at, dropping");
        return Ok(());
    };

    upsert_user(pool, &pr["user"]).await?;

    let state = pr["state"].as_str().unwrap_or("open");
    let draft = pr["draft"].as_bool().unwrap_or(false);
    let title = pr["title"].as_str().unwrap_or("");
    let body = pr["body"].as_str();
    let author_user_id = pr["user"]["id"].as_i64();
    let head_ref = pr["head"]["ref"].as_str().unwrap_or("");
    let base_ref = pr["base"]["ref"].as_str().unwrap_or("");
    let mergeable_state = pr["mergeable_state"].as_str();
    let merged_at = parse_ts(pr["merged_at"].as_str());
    let closed_at = parse_ts(pr["closed_at"].as_str());
    let comment_count = pr["comments"].as_i64().unwrap_or(0) as i32;
    let review_count = pr["review_comments"].as_i64().unwrap_or(0) as i32;

    sqlx::query(
        r#"INSERT INTO pull_requests
             (id, repository_id, number, github_pr_id, state, draft, title, body,
              author_user_id, head_ref, head_sha, base_ref, mergeable_state,
              merged_at, closed_at, comment_count, review_count, github_updated_at)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
           ON CONFLICT (repository_id, number) DO UPDATE SET
             github_pr_id = excluded.github_pr_id,
             state = excluded.state,
             draft = excluded.draft,
             title = excluded.title,
             body = excluded.body,
             author_user_id = excluded.author_user_id,
             head_ref = excluded.head_ref,
             head_sha = excluded.head_sha,
             base_ref = excluded.base_ref,
             mergeable_state = excluded.mergeable_state,
             merged_at = excluded.merged_at,
             closed_at = excluded.closed_at,
             comment_count = excluded.comment_count,
             review_count = excluded.review_count,
             github_updated_at = excluded.github_updated_at,
             updated_at = now()
           WHERE pull_requests.github_updated_at <= excluded.github_updated_at"#,
    )
    .bind(repository_id)
    .bind(number as i32)
    .bind(github_pr_id)
    .bind(state)
    .bind(draft)
    .bind(title)
    .bind(body)
    .bind(author_user_id)
    .bind(head_ref)
    .bind(head_sha)
    .bind(base_ref)
    .bind(mergeable_state)
    .bind(merged_at)
    .bind(closed_at)
    .bind(comment_count)
    .bind(review_count)
    .bind(github_updated_at)
    .execute(pool)
    .await?;

    Ok(())
}
