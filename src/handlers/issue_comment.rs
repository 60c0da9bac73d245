//! Handler: `issue_comment` events (spec.md §4.5).

use sqlx::PgPool;

use super::common::{parse_ts, upsert_user};

pub async fn handle(
    pool: &PgPool,
    repository_id: i64,
    action: &str,
    payload: &serde_json::Value,
) -> anyhow::Result<()> {
    let comment = &payload["comment"];
    let Some(github_comment_id) = comment["id"].as_i64() else {
        return Ok(());
    };
    let Some(issue_number) = payload["issue"]["number"].as_i64() else {
        return Ok(());
    };

    if action == "deleted" {
        sqlx::query("DELETE FROM issue_comments WHERE repository_id = $1 AND github_comment_id = $2")
            .bind(repository_id)
            .bind(github_comment_id)
            .execute(pool)
            .await?;
        return Ok(());
    }

    upsert_from_rest(pool, repository_id, issue_number as i32, comment).await
}

/// Upsert one comment row directly from a GitHub REST/webhook comment
/// object (same JSON shape either way). Used by the webhook handler above
/// and by on-demand sync (spec.md §4.16), which fetches comments via REST.
pub async fn upsert_from_rest(
    pool: &PgPool,
    repository_id: i64,
    issue_number: i32,
    comment: &serde_json::Value,
) -> anyhow::Result<()> {
    let Some(github_comment_id) = comment["id"].as_i64() else {
        return Ok(());
    };

    upsert_user(pool, &comment["user"]).await?;

    let author_user_id = comment["user"]["id"].as_i64();
    let body = comment["body"].as_str().unwrap_or("");
    let Some(github_created_at) = parse_ts(comment["created_at"].as_str()) else {
        return Ok(());
    };
    let github_updated_at = parse_ts(comment["updated_at"].as_str()).unwrap_or(github_created_at);

    // Comments have no stable update counter of their own; replace-on-exists
    // is safe here because `github_comment_id` is an immutable identity
    // (spec.md §9 "out-of-order as the norm").
    sqlx::query(
        r#"INSERT INTO issue_comments
             (id, repository_id, github_comment_id, issue_number, author_user_id,
              body, github_created_at, github_updated_at)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7)
           ON CONFLICT (repository_id, github_comment_id) DO UPDATE SET
             author_user_id = excluded.author_user_id,
             body = excluded.body,
             github_updated_at = excluded.github_updated_at,
             updated_at = now()"#,
    )
    .bind(repository_id)
    .bind(github_comment_id)
    .bind(issue_number)
    .bind(author_user_id)
    .bind(body)
    .bind(github_created_at)
    .bind(github_updated_at)
    .execute(pool)
    .await?;

    Ok(())
}
