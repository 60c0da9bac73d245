//! Read query surface (spec.md §4.18). Every read is strictly bounded —
//! no unbounded scans back the dashboard.

use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::{
    ActivityEntry, CheckRun, Issue, IssueComment, Page, PullRequest, PullRequestFile,
    PullRequestReview, RepoIssueListItem, RepoOverview, RepoPullRequestListItem,
};

const MAX_REPO_OVERVIEWS: i64 = 100;
const MAX_LIST_ROWS: i64 = 200;
const MAX_COMMENTS: i64 = 500;
const MAX_REVIEWS: i64 = 200;

pub async fn list_repos(pool: &PgPool) -> AppResult<Vec<RepoOverview>> {
    Ok(sqlx::query_as(
        "SELECT * FROM repo_overviews ORDER BY updated_at DESC LIMIT $1",
    )
    .bind(MAX_REPO_OVERVIEWS)
    .fetch_all(pool)
    .await?)
}

pub async fn repo_overview(pool: &PgPool, owner: &str, name: &str) -> AppResult<RepoOverview> {
    sqlx::query_as(
        r#"SELECT ro.* FROM repo_overviews ro
           JOIN repositories r ON r.repository_id = ro.repository_id
           WHERE r.owner_login = $1 AND r.name = $2"#,
    )
    .bind(owner)
    .bind(name)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::EntityNotFound)
}

pub async fn list_pull_requests(
    pool: &PgPool,
    repository_id: i64,
    cursor: Option<chrono::DateTime<chrono::Utc>>,
    limit: i64,
) -> AppResult<Page<RepoPullRequestListItem>> {
    let limit = limit.clamp(1, MAX_LIST_ROWS);
    let mut items: Vec<RepoPullRequestListItem> = sqlx::query_as(
        r#"SELECT * FROM repo_pull_request_list
           WHERE repository_id = $1 AND ($2::timestamptz IS NULL OR sort_updated < $2)
           ORDER BY sort_updated DESC LIMIT $3"#,
    )
    .bind(repository_id)
    .bind(cursor)
    .bind(limit + 1)
    .fetch_all(pool)
    .await?;

    let next_cursor = if items.len() as i64 > limit {
        items.truncate(limit as usize);
        items.last().map(|i| i.sort_updated.to_rfc3339())
    } else {
        None
    };

    Ok(Page { items, next_cursor })
}

pub async fn list_issues(
    pool: &PgPool,
    repository_id: i64,
    cursor: Option<chrono::DateTime<chrono::Utc>>,
    limit: i64,
) -> AppResult<Page<RepoIssueListItem>> {
    let limit = limit.clamp(1, MAX_LIST_ROWS);
    let mut items: Vec<RepoIssueListItem> = sqlx::query_as(
        r#"SELECT * FROM repo_issue_list
           WHERE repository_id = $1 AND ($2::timestamptz IS NULL OR sort_updated < $2)
           ORDER BY sort_updated DESC LIMIT $3"#,
    )
    .bind(repository_id)
    .bind(cursor)
    .bind(limit + 1)
    .fetch_all(pool)
    .await?;

    let next_cursor = if items.len() as i64 > limit {
        items.truncate(limit as usize);
        items.last().map(|i| i.sort_updated.to_rfc3339())
    } else {
        None
    };

    Ok(Page { items, next_cursor })
}

pub async fn list_activity(
    pool: &PgPool,
    repository_id: i64,
    cursor: Option<chrono::DateTime<chrono::Utc>>,
    limit: i64,
) -> AppResult<Page<ActivityEntry>> {
    let limit = limit.clamp(1, MAX_LIST_ROWS);
    let mut items: Vec<ActivityEntry> = sqlx::query_as(
        r#"SELECT * FROM activity_feed
           WHERE repository_id = $1 AND ($2::timestamptz IS NULL OR created_at < $2)
           ORDER BY created_at DESC LIMIT $3"#,
    )
    .bind(repository_id)
    .bind(cursor)
    .bind(limit + 1)
    .fetch_all(pool)
    .await?;

    let next_cursor = if items.len() as i64 > limit {
        items.truncate(limit as usize);
        items.last().map(|i| i.created_at.to_rfc3339())
    } else {
        None
    };

    Ok(Page { items, next_cursor })
}

#[derive(Debug, serde::Serialize)]
pub struct PullRequestDetail {
    pub pull_request: PullRequest,
    pub author_login: Option<String>,
    pub author_avatar_url: Option<String>,
    pub comments: Vec<IssueComment>,
    pub reviews: Vec<PullRequestReview>,
    pub check_runs: Vec<CheckRun>,
    pub files: Vec<PullRequestFile>,
}

pub async fn pr_detail(pool: &PgPool, repository_id: i64, number: i32) -> AppResult<PullRequestDetail> {
    let pull_request: PullRequest = sqlx::query_as(
        "SELECT * FROM pull_requests WHERE repository_id = $1 AND number = $2",
    )
    .bind(repository_id)
    .bind(number)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::EntityNotFound)?;

    let (author_login, author_avatar_url): (Option<String>, Option<String>) = sqlx::query_as(
        "SELECT login, avatar_url FROM users WHERE github_user_id = $1",
    )
    .bind(pull_request.author_user_id)
    .fetch_optional(pool)
    .await?
    .unwrap_or((None, None));

    let comments: Vec<IssueComment> = sqlx::query_as(
        "SELECT * FROM issue_comments WHERE repository_id = $1 AND issue_number = $2 ORDER BY github_created_at LIMIT $3",
    )
    .bind(repository_id)
    .bind(number)
    .bind(MAX_COMMENTS)
    .fetch_all(pool)
    .await?;

    let reviews: Vec<PullRequestReview> = sqlx::query_as(
        "SELECT * FROM pull_request_reviews WHERE repository_id = $1 AND pull_request_number = $2 ORDER BY submitted_at LIMIT $3",
    )
    .bind(repository_id)
    .bind(number)
    .bind(MAX_REVIEWS)
    .fetch_all(pool)
    .await?;

    let check_runs: Vec<CheckRun> = sqlx::query_as(
        "SELECT * FROM check_runs WHERE repository_id = $1 AND head_sha = $2",
    )
    .bind(repository_id)
    .bind(&pull_request.head_sha)
    .fetch_all(pool)
    .await?;

    let files: Vec<PullRequestFile> = sqlx::query_as(
        "SELECT * FROM pull_request_files WHERE repository_id = $1 AND pull_request_number = $2 ORDER BY filename",
    )
    .bind(repository_id)
    .bind(number)
    .fetch_all(pool)
    .await?;

    Ok(PullRequestDetail { pull_request, author_login, author_avatar_url, comments, reviews, check_runs, files })
}

#[derive(Debug, serde::Serialize)]
pub struct IssueDetail {
    pub issue: Issue,
    pub author_login: Option<String>,
    pub author_avatar_url: Option<String>,
    pub comments: Vec<IssueComment>,
}

pub async fn issue_detail(pool: &PgPool, repository_id: i64, number: i32) -> AppResult<IssueDetail> {
    let issue: Issue = sqlx::query_as(
        "SELECT * FROM issues WHERE repository_id = $1 AND number = $2",
    )
    .bind(repository_id)
    .bind(number)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::EntityNotFound)?;

    let (author_login, author_avatar_url): (Option<String>, Option<String>) = sqlx::query_as(
        "SELECT login, avatar_url FROM users WHERE github_user_id = $1",
    )
    .bind(issue.author_user_id)
    .fetch_optional(pool)
    .await?
    .unwrap_or((None, None));

    let comments: Vec<IssueComment> = sqlx::query_as(
        "SELECT * FROM issue_comments WHERE repository_id = $1 AND issue_number = $2 ORDER BY github_created_at LIMIT $3",
    )
    .bind(repository_id)
    .bind(number)
    .bind(MAX_COMMENTS)
    .fetch_all(pool)
    .await?;

    Ok(IssueDetail { issue, author_login, author_avatar_url, comments })
}

pub async fn repository_id_for(pool: &PgPool, owner: &str, name: &str) -> AppResult<i64> {
    sqlx::query_scalar("SELECT repository_id FROM repositories WHERE owner_login = $1 AND name = $2")
        .bind(owner)
        .bind(name)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::EntityNotFound)
}
