//! Handler: `pull_request_review` events (spec.md §4.7).

use sqlx::PgPool;

use super::common::{parse_ts, upsert_user};

pub async fn handle(pool: &PgPool, repository_id: i64, payload: &serde_json::Value) -> anyhow::Result<()> {
    let review = &payload["review"];
    let Some(pr_number) = payload["pull_request"]["number"].as_i64() else {
        return Ok(());
    };

    upsert_from_rest(pool, repository_id, pr_number as i32, review).await
}

/// Upsert one review row directly from a GitHub REST/webhook review object.
/// Used by the webhook handler above and by on-demand sync (spec.md §4.16).
pub async fn upsert_from_rest(
    pool: &PgPool,
    repository_id: i64,
    pr_number: i32,
    review: &serde_json::Value,
) -> anyhow::Result<()> {
    let Some(github_review_id) = review["id"].as_i64() else {
        return Ok(());
    };

    upsert_user(pool, &review["user"]).await?;

    let reviewer_user_id = review["user"]["id"].as_i64();
    let state = review["state"].as_str().unwrap_or("");
    let submitted_at = parse_ts(review["submitted_at"].as_str());
    let commit_id = review["commit_id"].as_str();

    sqlx::query(
        r#"INSERT INTO pull_request_reviews
             (id, repository_id, github_review_id, pull_request_number,
              reviewer_user_id, state, submitted_at, commit_id)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7)
           ON CONFLICT (repository_id, github_review_id) DO UPDATE SET
             reviewer_user_id = excluded.reviewer_user_id,
             state = excluded.state,
             submitted_at = excluded.submitted_at,
             commit_id = excluded.commit_id,
             updated_at = now()"#,
    )
    .bind(repository_id)
    .bind(github_review_id)
    .bind(pr_number)
    .bind(reviewer_user_id)
    .bind(state)
    .bind(submitted_at)
    .bind(commit_id)
    .execute(pool)
    .await?;

    Ok(())
}
