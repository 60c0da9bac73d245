//! Domain-plane rows: the normalized GitHub entities, one table per kind,
//! each keyed by a GitHub-stable identifier per spec.md §3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub github_user_id: i64,
    pub login: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Branch {
    pub id: Uuid,
    pub repository_id: i64,
    pub name: String,
    pub head_sha: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Commit {
    pub id: Uuid,
    pub repository_id: i64,
    pub sha: String,
    pub message_headline: String,
    pub author_user_id: Option<i64>,
    pub authored_at: DateTime<Utc>,
    pub committed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PullRequest {
    pub id: Uuid,
    pub repository_id: i64,
    pub number: i32,
    pub github_pr_id: i64,
    pub state: String, // "open" | "closed"
    pub draft: bool,
    pub title: String,
    pub body: Option<String>,
    pub author_user_id: Option<i64>,
    pub head_ref: String,
    pub head_sha: String,
    pub base_ref: String,
    pub mergeable_state: Option<String>,
    pub merged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub comment_count: i32,
    pub review_count: i32,
    pub github_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PullRequestReview {
    pub id: Uuid,
    pub repository_id: i64,
    pub github_review_id: i64,
    pub pull_request_number: i32,
    pub reviewer_user_id: Option<i64>,
    pub state: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub commit_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Issue {
    pub id: Uuid,
    pub repository_id: i64,
    pub number: i32,
    pub github_issue_id: i64,
    pub state: String,
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub assignee_user_ids: Vec<i64>,
    pub author_user_id: Option<i64>,
    pub is_pull_request: bool,
    pub comment_count: i32,
    pub closed_at: Option<DateTime<Utc>>,
    pub github_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IssueComment {
    pub id: Uuid,
    pub repository_id: i64,
    pub github_comment_id: i64,
    pub issue_number: i32,
    pub author_user_id: Option<i64>,
    pub body: String,
    pub github_created_at: DateTime<Utc>,
    pub github_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckRun {
    pub id: Uuid,
    pub repository_id: i64,
    pub github_check_run_id: i64,
    pub name: String,
    pub head_sha: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Removed,
    Modified,
    Renamed,
    Copied,
    Changed,
    Unchanged,
}

impl FileStatus {
    /// Coerce an arbitrary GitHub `status` string into the closed set from
    /// spec.md §4.14, defaulting to `changed` for anything unrecognized.
    pub fn coerce(raw: &str) -> Self {
        match raw {
            "added" => FileStatus::Added,
            "removed" => FileStatus::Removed,
            "modified" => FileStatus::Modified,
            "renamed" => FileStatus::Renamed,
            "copied" => FileStatus::Copied,
            "unchanged" => FileStatus::Unchanged,
            _ => FileStatus::Changed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Added => "added",
            FileStatus::Removed => "removed",
            FileStatus::Modified => "modified",
            FileStatus::Renamed => "renamed",
            FileStatus::Copied => "copied",
            FileStatus::Changed => "changed",
            FileStatus::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PullRequestFile {
    pub id: Uuid,
    pub repository_id: i64,
    pub pull_request_number: i32,
    pub filename: String,
    pub status: String,
    pub additions: i32,
    pub deletions: i32,
    pub patch: Option<String>,
    pub head_sha: String,
    pub cached_at: DateTime<Utc>,
}
