//! Projection-plane rows: pure functions of normalized domain state,
//! rebuilt rather than incrementally maintained (spec.md §4.12).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RepoOverview {
    pub repository_id: i64,
    pub open_pr_count: i32,
    pub open_issue_count: i32,
    pub failing_check_count: i32,
    pub last_push_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RepoPullRequestListItem {
    pub repository_id: i64,
    pub number: i32,
    pub title: String,
    pub state: String,
    pub draft: bool,
    pub author_login: Option<String>,
    pub author_avatar_url: Option<String>,
    pub comment_count: i32,
    pub review_count: i32,
    pub last_check_conclusion: Option<String>,
    pub sort_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RepoIssueListItem {
    pub repository_id: i64,
    pub number: i32,
    pub title: String,
    pub state: String,
    pub author_login: Option<String>,
    pub author_avatar_url: Option<String>,
    pub comment_count: i32,
    pub sort_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub repository_id: i64,
    pub activity_type: String,
    pub title: String,
    pub description: Option<String>,
    pub actor_login: Option<String>,
    pub actor_avatar_url: Option<String>,
    pub entity_number: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// What a payload→activity mapping (spec.md §4.11 step 1) produces, before
/// it is stamped with a repository id and inserted.
#[derive(Debug, Clone)]
pub struct ActivityInfo {
    pub activity_type: String,
    pub title: String,
    pub description: Option<String>,
    pub actor_login: Option<String>,
    pub actor_avatar_url: Option<String>,
    pub entity_number: Option<i32>,
}
