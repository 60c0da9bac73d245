//! Per-event-kind handlers (spec.md §4.3–§4.10) and the dispatcher that
//! maps a `(event_name, action)` pair onto one of them.
//!
//! Per spec.md §9 "Tagged variants for payload dispatch": the handlers
//! form a closed set, modeled here as [`WebhookEvent`]. `classify` is the
//! parser — anything it can't place lands in `WebhookEvent::Unknown`,
//! which the dispatcher's catch-all arm turns into a success no-op so the
//! delivery still reaches `processed` (spec.md §4.10).

pub mod check_run;
pub mod common;
pub mod create_delete;
pub mod issue_comment;
pub mod issues;
pub mod pull_request;
pub mod pull_request_review;
pub mod push;

use sqlx::PgPool;

pub enum WebhookEvent {
    Issues,
    PullRequest,
    IssueComment,
    PullRequestReview,
    Push,
    CheckRun,
    CreateBranch,
    DeleteBranch,
    Unknown,
}

pub fn classify(event_name: &str, payload: &serde_json::Value) -> WebhookEvent {
    match event_name {
        "issues" => WebhookEvent::Issues,
        "pull_request" => WebhookEvent::PullRequest,
        "issue_comment" => WebhookEvent::IssueComment,
        "pull_request_review" => WebhookEvent::PullRequestReview,
        "push" => WebhookEvent::Push,
        "check_run" => WebhookEvent::CheckRun,
        "create" if payload["ref_type"].as_str() == Some("branch") => WebhookEvent::CreateBranch,
        "delete" if payload["ref_type"].as_str() == Some("branch") => WebhookEvent::DeleteBranch,
        _ => WebhookEvent::Unknown,
    }
}

/// Dispatch one delivery's payload to its handler, by the delivery's stored
/// `event_name`. Total over [`WebhookEvent`]: the catch-all arm always
/// succeeds (spec.md §4.10).
pub async fn dispatch(
    pool: &PgPool,
    repository_id: i64,
    event_name: &str,
    action: Option<&str>,
    payload: &serde_json::Value,
) -> anyhow::Result<()> {
    match classify(event_name, payload) {
        WebhookEvent::Issues => issues::handle(pool, repository_id, payload).await,
        WebhookEvent::PullRequest => pull_request::handle(pool, repository_id, payload).await,
        WebhookEvent::IssueComment => {
            issue_comment::handle(pool, repository_id, action.unwrap_or(""), payload).await
        }
        WebhookEvent::PullRequestReview => {
            pull_request_review::handle(pool, repository_id, payload).await
        }
        WebhookEvent::Push => push::handle(pool, repository_id, payload).await,
        WebhookEvent::CheckRun => check_run::handle(pool, repository_id, payload).await,
        WebhookEvent::CreateBranch => create_delete::handle_create(pool, repository_id, payload).await,
        WebhookEvent::DeleteBranch => create_delete::handle_delete(pool, repository_id, payload).await,
        WebhookEvent::Unknown => {
            tracing::debug!(event_name, "no handler for event, treating as no-op");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_branch_create_vs_tag_create() {
        assert!(matches!(
            classify("create", &json!({"ref_type": "branch"})),
            WebhookEvent::CreateBranch
        ));
        assert!(matches!(
            classify("create", &json!({"ref_type": "tag"})),
            WebhookEvent::Unknown
        ));
    }

    #[test]
    fn classify_unknown_event_name() {
        assert!(matches!(classify("star", &json!({})), WebhookEvent::Unknown));
    }
}
