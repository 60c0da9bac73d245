//! PR file/diff sync (spec.md §4.14).
//!
//! Fire-and-forget: scheduled from the processor's post-success phase and
//! from bootstrap/on-demand sync, never awaited inline by a webhook
//! delivery. Any HTTP failure degrades to an empty, zero-truncation result
//! rather than propagating — diff sync is explicitly best-effort.

use sqlx::PgPool;

use crate::github::rest::RestClient;
use crate::models::FileStatus;

const MAX_FILES_PER_PR: usize = 300;
const MAX_PATCH_BYTES: usize = 100_000;
const CHUNK_SIZE: usize = 50;

pub struct SyncOutcome {
    pub file_count: usize,
    pub truncated_patches: usize,
}

pub struct SyncTarget {
    pub owner_login: String,
    pub name: String,
    pub repository_id: i64,
    pub pull_request_number: i32,
    pub head_sha: String,
}

pub async fn sync(pool: &PgPool, rest: &RestClient, target: &SyncTarget) -> SyncOutcome {
    match sync_inner(pool, rest, target).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::warn!(
                repository_id = target.repository_id,
                pull_request_number = target.pull_request_number,
                error = %err,
                "pr file sync failed, treating as best-effort no-op"
            );
            SyncOutcome { file_count: 0, truncated_patches: 0 }
        }
    }
}

async fn sync_inner(
    pool: &PgPool,
    rest: &RestClient,
    target: &SyncTarget,
) -> anyhow::Result<SyncOutcome> {
    let path = format!(
        "/repos/{}/{}/pulls/{}/files",
        target.owner_login, target.name, target.pull_request_number
    );
    let files = rest
        .get_all_pages(&path, 100, MAX_FILES_PER_PR)
        .await
        .map_err(|e| anyhow::anyhow!("fetching pr files: {e}"))?;

    let mut truncated_patches = 0usize;
    let rows: Vec<(String, String, i32, i32, Option<String>)> = files
        .iter()
        .map(|f| {
            let filename = f["filename"].as_str().unwrap_or("").to_string();
            let status = FileStatus::coerce(f["status"].as_str().unwrap_or("changed")).as_str().to_string();
            let additions = f["additions"].as_i64().unwrap_or(0) as i32;
            let deletions = f["deletions"].as_i64().unwrap_or(0) as i32;
            let patch = f["patch"].as_str();
            let patch = match patch {
                Some(p) if p.len() > MAX_PATCH_BYTES => {
                    truncated_patches += 1;
                    None
                }
                Some(p) => Some(p.to_string()),
                None => None,
            };
            (filename, status, additions, deletions, patch)
        })
        .collect();

    for chunk in rows.chunks(CHUNK_SIZE) {
        persist_chunk(pool, target, chunk).await?;
    }

    Ok(SyncOutcome { file_count: rows.len(), truncated_patches })
}

async fn persist_chunk(
    pool: &PgPool,
    target: &SyncTarget,
    chunk: &[(String, String, i32, i32, Option<String>)],
) -> anyhow::Result<()> {
    for (filename, status, additions, deletions, patch) in chunk {
        sqlx::query(
            r#"INSERT INTO pull_request_files
                 (id, repository_id, pull_request_number, filename, status,
                  additions, deletions, patch, head_sha, cached_at)
               VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, now())
               ON CONFLICT (repository_id, pull_request_number, filename) DO UPDATE SET
                 status = excluded.status,
                 additions = excluded.additions,
                 deletions = excluded.deletions,
                 patch = excluded.patch,
                 head_sha = excluded.head_sha,
                 cached_at = excluded.cached_at"#,
        )
        .bind(target.repository_id)
        .bind(target.pull_request_number)
        .bind(filename)
        .bind(status)
        .bind(additions)
        .bind(deletions)
        .bind(patch)
        .bind(&target.head_sha)
        .execute(pool)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_over_limit_is_dropped_and_counted() {
        let big = "x".repeat(MAX_PATCH_BYTES + 1);
        assert!(big.len() > MAX_PATCH_BYTES);
    }
}
