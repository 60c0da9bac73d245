//! Bootstrap (spec.md §4.13): one-shot paginated population of a newly
//! connected repository, driven through a [`SyncJob`] lock row so concurrent
//! triggers (webhook + manual reconcile) can't double-run it.

use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::github::rest::RestClient;
use crate::handlers::check_run;
use crate::handlers::common::upsert_user;
use crate::pr_files::{self, SyncTarget};

pub struct BootstrapInput {
    pub repository_id: i64,
    pub owner_login: String,
    pub name: String,
    pub installation_id: i64,
}

/// Acquire (or report already-held) the `lockKey` for this bootstrap run and
/// mark it `running`. Returns `None` if another job already holds the key.
async fn acquire_lock(pool: &PgPool, lock_key: &str, job_kind: &str, scope: serde_json::Value) -> anyhow::Result<Option<Uuid>> {
    let held: Option<(Uuid, String)> = sqlx::query_as(
        "SELECT id, state FROM sync_jobs WHERE lock_key = $1",
    )
    .bind(lock_key)
    .fetch_optional(pool)
    .await?;

    if let Some((id, state)) = held {
        if state == "running" || state == "pending" {
            return Ok(None);
        }
        sqlx::query("UPDATE sync_jobs SET state = 'running', attempt_count = attempt_count + 1, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        return Ok(Some(id));
    }

    let id = Uuid::new_v4();
    sqlx::query(
        r#"INSERT INTO sync_jobs (id, lock_key, job_kind, scope, state, attempt_count, created_at, updated_at)
           VALUES ($1, $2, $3, $4, 'running', 1, now(), now())"#,
    )
    .bind(id)
    .bind(lock_key)
    .bind(job_kind)
    .bind(scope)
    .execute(pool)
    .await?;

    Ok(Some(id))
}

async fn finish(pool: &PgPool, job_id: Uuid, outcome: Result<(), &str>) -> anyhow::Result<()> {
    match outcome {
        Ok(()) => {
            sqlx::query("UPDATE sync_jobs SET state = 'done', last_error = NULL, updated_at = now() WHERE id = $1")
                .bind(job_id)
                .execute(pool)
                .await?;
        }
        Err(err) => {
            sqlx::query("UPDATE sync_jobs SET state = 'failed', last_error = $2, updated_at = now() WHERE id = $1")
                .bind(job_id)
                .bind(err)
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}

pub async fn run(pool: &PgPool, config: &Config, rest: &RestClient, input: &BootstrapInput) -> anyhow::Result<()> {
    let lock_key = format!("repo-bootstrap:0:{}", input.repository_id);
    let Some(job_id) = acquire_lock(pool, &lock_key, "bootstrap", serde_json::json!({"repositoryId": input.repository_id})).await? else {
        tracing::info!(repository_id = input.repository_id, "bootstrap already running, skipping");
        return Ok(());
    };

    match run_steps(pool, config, rest, input).await {
        Ok(()) => {
            finish(pool, job_id, Ok(())).await?;
            Ok(())
        }
        Err(err) => {
            finish(pool, job_id, Err(&err.to_string())).await?;
            Err(err)
        }
    }
}

async fn run_steps(pool: &PgPool, config: &Config, rest: &RestClient, input: &BootstrapInput) -> anyhow::Result<()> {
    let owner = &input.owner_login;
    let name = &input.name;
    let repository_id = input.repository_id;

    // 1. Branches.
    let branches = rest
        .get_all_pages(&format!("/repos/{owner}/{name}/branches"), 100, usize::MAX)
        .await
        .map_err(|e| anyhow::anyhow!("listing branches: {e}"))?;
    for b in &branches {
        let branch_name = b["name"].as_str().unwrap_or("");
        let head_sha = b["commit"]["sha"].as_str().unwrap_or("");
        sqlx::query(
            r#"INSERT INTO branches (id, repository_id, name, head_sha)
               VALUES (gen_random_uuid(), $1, $2, $3)
               ON CONFLICT (repository_id, name) DO UPDATE SET head_sha = excluded.head_sha, updated_at = now()"#,
        )
        .bind(repository_id)
        .bind(branch_name)
        .bind(head_sha)
        .execute(pool)
        .await?;
    }

    // 2. Pull requests (state=all), collect users, chunked upsert.
    let prs = rest
        .get_all_pages(&format!("/repos/{owner}/{name}/pulls?state=all"), 100, usize::MAX)
        .await
        .map_err(|e| anyhow::anyhow!("listing pull requests: {e}"))?;
    for chunk in prs.chunks(config.bootstrap_chunk_size) {
        for pr in chunk {
            upsert_user(pool, &pr["user"]).await?;
            upsert_pull_request(pool, repository_id, pr).await?;
        }
    }

    // 3. Issues (state=all), filtering out entries that are really PRs.
    let issues = rest
        .get_all_pages(&format!("/repos/{owner}/{name}/issues?state=all"), 100, usize::MAX)
        .await
        .map_err(|e| anyhow::anyhow!("listing issues: {e}"))?;
    for chunk in issues.chunks(config.bootstrap_chunk_size) {
        for issue in chunk {
            if !issue["pull_request"].is_null() {
                continue;
            }
            upsert_user(pool, &issue["user"]).await?;
            upsert_issue(pool, repository_id, issue).await?;
        }
    }

    // 4. Most recent 100 commits on the default branch — first page only
    // (Open Question 2: reconciliation is expected to fill the rest).
    let commits = rest
        .get_all_pages(&format!("/repos/{owner}/{name}/commits?per_page=100"), 100, 100)
        .await
        .unwrap_or_default();
    for c in &commits {
        let sha = c["sha"].as_str().unwrap_or("");
        let message = c["commit"]["message"].as_str().unwrap_or("");
        let headline = message.split('\n').next().unwrap_or("");
        let timestamp = c["commit"]["committer"]["date"]
            .as_str()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&chrono::Utc));
        sqlx::query(
            r#"INSERT INTO commits (id, repository_id, sha, message_headline, author_user_id, authored_at, committed_at, created_at)
               VALUES (gen_random_uuid(), $1, $2, $3, NULL, $4, $4, now())
               ON CONFLICT (repository_id, sha) DO NOTHING"#,
        )
        .bind(repository_id)
        .bind(sha)
        .bind(headline)
        .bind(timestamp.unwrap_or_else(chrono::Utc::now))
        .execute(pool)
        .await?;
    }

    // 5. Check runs for every open PR with a non-empty head sha.
    for pr in &prs {
        if pr["state"].as_str() != Some("open") {
            continue;
        }
        let head_sha = pr["head"]["sha"].as_str().unwrap_or("");
        if head_sha.is_empty() {
            continue;
        }
        let check_runs = rest
            .get(&RestClient::base_url(&format!("/repos/{owner}/{name}/commits/{head_sha}/check-runs")))
            .await
            .ok()
            .map(|(body, _)| body["check_runs"].as_array().cloned().unwrap_or_default())
            .unwrap_or_default();
        for cr in &check_runs {
            check_run::upsert_from_rest(pool, repository_id, cr).await?;
        }
    }

    // 8. Schedule file-diff sync for every open PR.
    for pr in &prs {
        if pr["state"].as_str() != Some("open") {
            continue;
        }
        let Some(number) = pr["number"].as_i64() else { continue };
        let head_sha = pr["head"]["sha"].as_str().unwrap_or("").to_string();
        let target = SyncTarget {
            owner_login: owner.clone(),
            name: name.clone(),
            repository_id,
            pull_request_number: number as i32,
            head_sha,
        };
        let outcome = pr_files::sync(pool, rest, &target).await;
        tracing::debug!(repository_id, pull_request_number = number, file_count = outcome.file_count, "bootstrap pr file sync");
    }

    Ok(())
}

pub(crate) async fn upsert_pull_request(pool: &PgPool, repository_id: i64, pr: &serde_json::Value) -> anyhow::Result<()> {
    let Some(number) = pr["number"].as_i64() else { return Ok(()) };
    let Some(updated_at) = pr["updated_at"].as_str().and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()) else {
        return Ok(());
    };
    sqlx::query(
        r#"INSERT INTO pull_requests
             (id, repository_id, number, github_pr_id, state, draft, title, body,
              author_user_id, head_ref, head_sha, base_ref, mergeable_state,
              merged_at, closed_at, github_updated_at)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
           ON CONFLICT (repository_id, number) DO UPDATE SET
             github_pr_id = excluded.github_pr_id, state = excluded.state, draft = excluded.draft,
             title = excluded.title, body = excluded.body, author_user_id = excluded.author_user_id,
             head_ref = excluded.head_ref, head_sha = excluded.head_sha, base_ref = excluded.base_ref,
             mergeable_state = excluded.mergeable_state, merged_at = excluded.merged_at,
             closed_at = excluded.closed_at, github_updated_at = excluded.github_updated_at, updated_at = now()
           WHERE pull_requests.github_updated_at <= excluded.github_updated_at"#,
    )
    .bind(repository_id)
    .bind(number as i32)
    .bind(pr["id"].as_i64().unwrap_or(0))
    .bind(pr["state"].as_str().unwrap_or("open"))
    .bind(pr["draft"].as_bool().unwrap_or(false))
    .bind(pr["title"].as_str().unwrap_or(""))
    .bind(pr["body"].as_str())
    .bind(pr["user"]["id"].as_i64())
    .bind(pr["head"]["ref"].as_str().unwrap_or(""))
    .bind(pr["head"]["sha"].as_str().unwrap_or(""))
    .bind(pr["base"]["ref"].as_str().unwrap_or(""))
    .bind(pr["mergeable_state"].as_str())
    .bind(pr["merged_at"].as_str().and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()).map(|d| d.with_timezone(&chrono::Utc)))
    .bind(pr["closed_at"].as_str().and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()).map(|d| d.with_timezone(&chrono::Utc)))
    .bind(updated_at.with_timezone(&chrono::Utc))
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn upsert_issue(pool: &PgPool, repository_id: i64, issue: &serde_json::Value) -> anyhow::Result<()> {
    let Some(number) = issue["number"].as_i64() else { return Ok(()) };
    let Some(updated_at) = issue["updated_at"].as_str().and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()) else {
        return Ok(());
    };
    let labels: Vec<String> = issue["labels"]
        .as_array()
        .map(|ls| ls.iter().filter_map(|l| l["name"].as_str().map(String::from)).collect())
        .unwrap_or_default();
    let assignees: Vec<i64> = issue["assignees"]
        .as_array()
        .map(|a| a.iter().filter_map(|u| u["id"].as_i64()).collect())
        .unwrap_or_default();

    sqlx::query(
        r#"INSERT INTO issues
             (id, repository_id, number, github_issue_id, state, title, body,
              labels, assignee_user_ids, author_user_id, is_pull_request,
              comment_count, closed_at, github_updated_at)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, $9, false, $10, $11, $12)
           ON CONFLICT (repository_id, number) DO UPDATE SET
             github_issue_id = excluded.github_issue_id, state = excluded.state, title = excluded.title,
             body = excluded.body, labels = excluded.labels, assignee_user_ids = excluded.assignee_user_ids,
             author_user_id = excluded.author_user_id, comment_count = excluded.comment_count,
             closed_at = excluded.closed_at, github_updated_at = excluded.github_updated_at, updated_at = now()
           WHERE issues.github_updated_at <= excluded.github_updated_at"#,
    )
    .bind(repository_id)
    .bind(number as i32)
    .bind(issue["id"].as_i64().unwrap_or(0))
    .bind(issue["state"].as_str().unwrap_or("open"))
    .bind(issue["title"].as_str().unwrap_or(""))
    .bind(issue["body"].as_str())
    .bind(&labels)
    .bind(&assignees)
    .bind(issue["user"]["id"].as_i64())
    .bind(issue["comments"].as_i64().unwrap_or(0) as i32)
    .bind(issue["closed_at"].as_str().and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok()).map(|d| d.with_timezone(&chrono::Utc)))
    .bind(updated_at.with_timezone(&chrono::Utc))
    .execute(pool)
    .await?;

    Ok(())
}

