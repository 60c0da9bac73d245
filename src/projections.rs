//! Projection maintainer (spec.md §4.12).
//!
//! Every row here is a pure function of normalized domain state for one
//! repository — recomputed in full rather than patched incrementally, so
//! `update_all_projections` is safe to call as often as needed (post-success,
//! reconciliation, the slow drift-repair loop).

use sqlx::PgPool;

pub async fn update_all_projections(pool: &PgPool, repository_id: i64) -> anyhow::Result<()> {
    update_repo_overview(pool, repository_id).await?;
    rebuild_pr_list(pool, repository_id).await?;
    rebuild_issue_list(pool, repository_id).await?;
    Ok(())
}

async fn update_repo_overview(pool: &PgPool, repository_id: i64) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO repo_overviews
             (repository_id, open_pr_count, open_issue_count, failing_check_count,
              last_push_at, updated_at)
           SELECT
             r.repository_id,
             (SELECT count(*) FROM pull_requests pr WHERE pr.repository_id = r.repository_id AND pr.state = 'open'),
             (SELECT count(*) FROM issues i WHERE i.repository_id = r.repository_id AND i.state = 'open' AND NOT i.is_pull_request),
             (SELECT count(*) FROM check_runs cr WHERE cr.repository_id = r.repository_id AND cr.conclusion = 'failure'),
             greatest(
               (SELECT max(b.updated_at) FROM branches b WHERE b.repository_id = r.repository_id),
               r.pushed_at
             ),
             now()
           FROM repositories r
           WHERE r.repository_id = $1
           ON CONFLICT (repository_id) DO UPDATE SET
             open_pr_count = excluded.open_pr_count,
             open_issue_count = excluded.open_issue_count,
             failing_check_count = excluded.failing_check_count,
             last_push_at = excluded.last_push_at,
             updated_at = excluded.updated_at"#,
    )
    .bind(repository_id)
    .execute(pool)
    .await?;

    Ok(())
}

async fn rebuild_pr_list(pool: &PgPool, repository_id: i64) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM repo_pull_request_list WHERE repository_id = $1")
        .bind(repository_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"INSERT INTO repo_pull_request_list
             (repository_id, number, title, state, draft, author_login,
              author_avatar_url, comment_count, review_count,
              last_check_conclusion, sort_updated)
           SELECT
             pr.repository_id,
             pr.number,
             pr.title,
             pr.state,
             pr.draft,
             u.login,
             u.avatar_url,
             pr.comment_count,
             (SELECT count(*) FROM pull_request_reviews prr
                WHERE prr.repository_id = pr.repository_id
                  AND prr.pull_request_number = pr.number),
             (SELECT cr.conclusion FROM check_runs cr
                WHERE cr.repository_id = pr.repository_id AND cr.head_sha = pr.head_sha
                ORDER BY cr.completed_at DESC NULLS LAST LIMIT 1),
             pr.github_updated_at
           FROM pull_requests pr
           LEFT JOIN users u ON u.github_user_id = pr.author_user_id
           WHERE pr.repository_id = $1"#,
    )
    .bind(repository_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

async fn rebuild_issue_list(pool: &PgPool, repository_id: i64) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM repo_issue_list WHERE repository_id = $1")
        .bind(repository_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"INSERT INTO repo_issue_list
             (repository_id, number, title, state, author_login,
              author_avatar_url, comment_count, sort_updated)
           SELECT
             i.repository_id,
             i.number,
             i.title,
             i.state,
             u.login,
             u.avatar_url,
             i.comment_count,
             i.github_updated_at
           FROM issues i
           LEFT JOIN users u ON u.github_user_id = i.author_user_id
           WHERE i.repository_id = $1 AND NOT i.is_pull_request"#,
    )
    .bind(repository_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Slow drift-repair loop (spec.md §5): recompute projections for every
/// known repository. Best-effort per repository — one failure does not
/// abort the sweep.
pub async fn repair_all(pool: &PgPool) -> anyhow::Result<u64> {
    let repo_ids: Vec<i64> =
        sqlx::query_scalar("SELECT repository_id FROM repositories")
            .fetch_all(pool)
            .await?;

    let mut repaired = 0u64;
    for repository_id in repo_ids {
        if let Err(err) = update_all_projections(pool, repository_id).await {
            tracing::warn!(repository_id, error = %err, "projection repair failed for repository");
            continue;
        }
        repaired += 1;
    }

    Ok(repaired)
}
