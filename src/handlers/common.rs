//! Shared helpers used by every per-event handler: installation/repository
//! auto-creation (spec.md §3 Lifecycle), user upsert, and timestamp parsing.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Parse an RFC3339 timestamp as GitHub sends it (`updated_at`,
/// `submitted_at`, …). Returns `None` on empty/missing/unparseable input —
/// callers treat that as "field absent", per spec.md §7's validation rule
/// that a missing mandatory field drops the event rather than retries it.
pub fn parse_ts(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.filter(|s| !s.is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Upsert the `installations` row referenced by a webhook payload's
/// `installation` object, if present. Installations are created on first
/// webhook (spec.md §3 Lifecycle).
pub async fn ensure_installation(pool: &PgPool, payload: &serde_json::Value) -> anyhow::Result<()> {
    let installation = &payload["installation"];
    let Some(installation_id) = installation["id"].as_i64() else {
        return Ok(());
    };
    let account = &installation["account"];
    let login = account["login"].as_str().unwrap_or("unknown");
    let kind = account["type"].as_str().unwrap_or("User");

    sqlx::query(
        r#"INSERT INTO installations (id, installation_id, account_login, account_kind)
           VALUES (gen_random_uuid(), $1, $2, $3)
           ON CONFLICT (installation_id) DO UPDATE SET
             account_login = excluded.account_login,
             account_kind = excluded.account_kind,
             updated_at = now()"#,
    )
    .bind(installation_id)
    .bind(login)
    .bind(kind)
    .execute(pool)
    .await?;

    Ok(())
}

/// Upsert the `repositories` row referenced by a webhook payload's
/// `repository` object, if present and not already known. Repositories are
/// created on first webhook or explicit connect (spec.md §3 Lifecycle) —
/// an existing row's fields are refreshed but never regressed, since the
/// repository object in a webhook payload carries no reliable version
/// counter of its own.
pub async fn ensure_repository(
    pool: &PgPool,
    payload: &serde_json::Value,
    installation_id: Option<i64>,
) -> anyhow::Result<()> {
    let repo = &payload["repository"];
    let Some(repository_id) = repo["id"].as_i64() else {
        return Ok(());
    };
    let owner_login = repo["owner"]["login"].as_str().unwrap_or("unknown");
    let name = repo["name"].as_str().unwrap_or("");
    let full_name = repo["full_name"].as_str().unwrap_or("");
    let visibility = if repo["private"].as_bool().unwrap_or(false) {
        "private"
    } else {
        repo["visibility"].as_str().unwrap_or("public")
    };
    let default_branch = repo["default_branch"].as_str().unwrap_or("main");
    let archived = repo["archived"].as_bool().unwrap_or(false);
    let disabled = repo["disabled"].as_bool().unwrap_or(false);
    let is_fork = repo["fork"].as_bool().unwrap_or(false);
    let pushed_at = parse_ts(repo["pushed_at"].as_str());
    let github_updated_at = parse_ts(repo["updated_at"].as_str());

    sqlx::query(
        r#"INSERT INTO repositories
             (id, repository_id, installation_id, owner_login, name, full_name,
              visibility, default_branch, archived, disabled, is_fork,
              pushed_at, github_updated_at)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
           ON CONFLICT (repository_id) DO UPDATE SET
             owner_login = excluded.owner_login,
             name = excluded.name,
             full_name = excluded.full_name,
             visibility = excluded.visibility,
             default_branch = excluded.default_branch,
             archived = excluded.archived,
             disabled = excluded.disabled,
             is_fork = excluded.is_fork,
             pushed_at = excluded.pushed_at,
             github_updated_at = excluded.github_updated_at,
             updated_at = now()"#,
    )
    .bind(repository_id)
    .bind(installation_id.unwrap_or(0))
    .bind(owner_login)
    .bind(name)
    .bind(full_name)
    .bind(visibility)
    .bind(default_branch)
    .bind(archived)
    .bind(disabled)
    .bind(is_fork)
    .bind(pushed_at)
    .bind(github_updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Upsert a user row from any GitHub `user`-shaped JSON object
/// (`{id, login, avatar_url}`). A no-op if `id` is missing.
pub async fn upsert_user(pool: &PgPool, user: &serde_json::Value) -> anyhow::Result<()> {
    let Some(github_user_id) = user["id"].as_i64() else {
        return Ok(());
    };
    let login = user["login"].as_str().unwrap_or("unknown");
    let avatar_url = user["avatar_url"].as_str();

    sqlx::query(
        r#"INSERT INTO users (id, github_user_id, login, avatar_url)
           VALUES (gen_random_uuid(), $1, $2, $3)
           ON CONFLICT (github_user_id) DO UPDATE SET
             login = excluded.login,
             avatar_url = excluded.avatar_url,
             updated_at = now()"#,
    )
    .bind(github_user_id)
    .bind(login)
    .bind(avatar_url)
    .execute(pool)
    .await?;

    Ok(())
}
