//! Handler: `push` events (spec.md §4.6).

use sqlx::PgPool;

use super::common::{parse_ts, upsert_user};

pub async fn handle(pool: &PgPool, repository_id: i64, payload: &serde_json::Value) -> anyhow::Result<()> {
    let git_ref = payload["ref"].as_str().unwrap_or("");
    let Some(branch) = git_ref.strip_prefix("refs/heads/") else {
        tracing::debug!(repository_id, git_ref, "push to a non-branch ref, dropping");
        return Ok(());
    };

    if payload["sender"].is_object() {
        upsert_user(pool, &payload["sender"]).await?;
    }

    if payload["deleted"].as_bool().unwrap_or(false) {
        sqlx::query("DELETE FROM branches WHERE repository_id = $1 AND name = $2")
            .bind(repository_id)
            .bind(branch)
            .execute(pool)
            .await?;
        return Ok(());
    }

    let after = payload["after"].as_str().unwrap_or("");

    sqlx::query(
        r#"INSERT INTO branches (id, repository_id, name, head_sha)
           VALUES (gen_random_uuid(), $1, $2, $3)
           ON CONFLICT (repository_id, name) DO UPDATE SET
             head_sha = excluded.head_sha,
             updated_at = now()"#,
    )
    .bind(repository_id)
    .bind(branch)
    .bind(after)
    .execute(pool)
    .await?;

    let commits = payload["commits"].as_array().cloned().unwrap_or_default();
    for commit in &commits {
        let Some(sha) = commit["id"].as_str() else { continue };
        let message = commit["message"].as_str().unwrap_or("");
        let message_headline = message.split('\n').next().unwrap_or("").to_string();
        let Some(timestamp) = parse_ts(commit["timestamp"].as_str()) else {
            continue;
        };

        // Webhook commit payloads carry author name/email, not a stable
        // GitHub user id, so `author_user_id` stays null here (spec.md §4.6).
        sqlx::query(
            r#"INSERT INTO commits (id, repository_id, sha, message_headline, author_user_id, authored_at, committed_at)
               VALUES (gen_random_uuid(), $1, $2, $3, NULL, $4, $4)
               ON CONFLICT (repository_id, sha) DO NOTHING"#,
        )
        .bind(repository_id)
        .bind(sha)
        .bind(&message_headline)
        .bind(timestamp)
        .execute(pool)
        .await?;
    }

    Ok(())
}
