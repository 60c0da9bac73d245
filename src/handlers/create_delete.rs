//! Handlers: `create` / `delete` events, branch refs only (spec.md §4.9).

use sqlx::PgPool;

pub async fn handle_create(pool: &PgPool, repository_id: i64, payload: &serde_json::Value) -> anyhow::Result<()> {
    if payload["ref_type"].as_str() != Some("branch") {
        return Ok(());
    }
    let Some(branch) = payload["ref"].as_str() else {
        return Ok(());
    };

    sqlx::query(
        r#"INSERT INTO branches (id, repository_id, name, head_sha)
           VALUES (gen_random_uuid(), $1, $2, '')
           ON CONFLICT (repository_id, name) DO NOTHING"#,
    )
    .bind(repository_id)
    .bind(branch)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn handle_delete(pool: &PgPool, repository_id: i64, payload: &serde_json::Value) -> anyhow::Result<()> {
    if payload["ref_type"].as_str() != Some("branch") {
        return Ok(());
    }
    let Some(branch) = payload["ref"].as_str() else {
        return Ok(());
    };

    sqlx::query("DELETE FROM branches WHERE repository_id = $1 AND name = $2")
        .bind(repository_id)
        .bind(branch)
        .execute(pool)
        .await?;

    Ok(())
}
