//! Activity feed mapping (spec.md §4.11 step 1).
//!
//! Maps `(eventName, action, payload)` onto an [`ActivityInfo`], which the
//! processor appends to the repository's `activity_feed` after a
//! successful handler run. Selected mappings only — anything not listed
//! in spec.md §4.11 produces no entry.

use sqlx::PgPool;

use crate::models::ActivityInfo;

const PREVIEW_LEN: usize = 200;

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

fn actor(payload: &serde_json::Value) -> (Option<String>, Option<String>) {
    let sender = &payload["sender"];
    (
        sender["login"].as_str().map(String::from),
        sender["avatar_url"].as_str().map(String::from),
    )
}

pub fn map_to_activity_info(
    event_name: &str,
    action: Option<&str>,
    payload: &serde_json::Value,
) -> Option<ActivityInfo> {
    let (actor_login, actor_avatar_url) = actor(payload);
    let action = action.unwrap_or("");

    match event_name {
        "issues" => {
            let issue = &payload["issue"];
            let entity_number = issue["number"].as_i64().map(|n| n as i32);
            let description = if action == "opened" {
                issue["body"].as_str().map(|b| truncate(b, PREVIEW_LEN))
            } else {
                None
            };
            Some(ActivityInfo {
                activity_type: format!("issue.{action}"),
                title: issue["title"].as_str().unwrap_or("").to_string(),
                description,
                actor_login,
                actor_avatar_url,
                entity_number,
            })
        }
        "pull_request" => {
            let pr = &payload["pull_request"];
            let entity_number = pr["number"].as_i64().map(|n| n as i32);
            let description = if action == "opened" {
                pr["body"].as_str().map(|b| truncate(b, PREVIEW_LEN))
            } else {
                None
            };
            Some(ActivityInfo {
                activity_type: format!("pr.{action}"),
                title: pr["title"].as_str().unwrap_or("").to_string(),
                description,
                actor_login,
                actor_avatar_url,
                entity_number,
            })
        }
        "issue_comment" => {
            let issue = &payload["issue"];
            let is_pr = !issue["pull_request"].is_null();
            let activity_type = if is_pr {
                format!("pr_comment.{action}")
            } else {
                format!("issue_comment.{action}")
            };
            let entity_number = issue["number"].as_i64().map(|n| n as i32);
            let comment_body = payload["comment"]["body"].as_str().unwrap_or("");
            Some(ActivityInfo {
                activity_type,
                title: format!("Comment on #{}", entity_number.unwrap_or(0)),
                description: Some(truncate(comment_body, PREVIEW_LEN)),
                actor_login,
                actor_avatar_url,
                entity_number,
            })
        }
        "push" => {
            let commits = payload["commits"].as_array().cloned().unwrap_or_default();
            let branch = payload["ref"]
                .as_str()
                .and_then(|r| r.strip_prefix("refs/heads/"))
                .unwrap_or("unknown");
            let description = commits
                .first()
                .and_then(|c| c["message"].as_str())
                .map(|m| m.split('\n').next().unwrap_or("").to_string());
            Some(ActivityInfo {
                activity_type: "push".to_string(),
                title: format!("Pushed {} commits to {branch}", commits.len()),
                description,
                actor_login,
                actor_avatar_url,
                entity_number: None,
            })
        }
        "pull_request_review" => {
            let state = payload["review"]["state"].as_str().unwrap_or("");
            let entity_number = payload["pull_request"]["number"].as_i64().map(|n| n as i32);
            Some(ActivityInfo {
                activity_type: format!("pr_review.{state}"),
                title: format!("Review {state} on #{}", entity_number.unwrap_or(0)),
                description: None,
                actor_login,
                actor_avatar_url,
                entity_number,
            })
        }
        "check_run" if action == "completed" => {
            let conclusion = payload["check_run"]["conclusion"].as_str().unwrap_or("unknown");
            Some(ActivityInfo {
                activity_type: format!("check_run.{conclusion}"),
                title: payload["check_run"]["name"].as_str().unwrap_or("").to_string(),
                description: None,
                actor_login,
                actor_avatar_url,
                entity_number: None,
            })
        }
        "create" if payload["ref_type"].as_str() == Some("branch") => {
            let branch = payload["ref"].as_str().unwrap_or("");
            Some(ActivityInfo {
                activity_type: "branch.created".to_string(),
                title: format!("Branch {branch} created"),
                description: None,
                actor_login,
                actor_avatar_url,
                entity_number: None,
            })
        }
        "delete" if payload["ref_type"].as_str() == Some("branch") => {
            let branch = payload["ref"].as_str().unwrap_or("");
            Some(ActivityInfo {
                activity_type: "branch.deleted".to_string(),
                title: format!("Branch {branch} deleted"),
                description: None,
                actor_login,
                actor_avatar_url,
                entity_number: None,
            })
        }
        _ => None,
    }
}

pub async fn append_entry(pool: &PgPool, repository_id: i64, info: ActivityInfo) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO activity_feed
             (id, repository_id, activity_type, title, description,
              actor_login, actor_avatar_url, entity_number)
           VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7)"#,
    )
    .bind(repository_id)
    .bind(&info.activity_type)
    .bind(&info.title)
    .bind(&info.description)
    .bind(&info.actor_login)
    .bind(&info.actor_avatar_url)
    .bind(info.entity_number)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn issue_opened_gets_body_preview() {
        let payload = json!({
            "issue": {"number": 1, "title": "Test issue", "body": "a".repeat(500)},
            "sender": {"login": "alice", "avatar_url": "https://x/a.png"}
        });
        let info = map_to_activity_info("issues", Some("opened"), &payload).unwrap();
        assert_eq!(info.activity_type, "issue.opened");
        assert_eq!(info.entity_number, Some(1));
        assert_eq!(info.description.unwrap().chars().count(), 200);
    }

    #[test]
    fn issue_edited_has_no_body_preview() {
        let payload = json!({"issue": {"number": 1, "title": "Test", "body": "hello"}});
        let info = map_to_activity_info("issues", Some("edited"), &payload).unwrap();
        assert_eq!(info.activity_type, "issue.edited");
        assert!(info.description.is_none());
    }

    #[test]
    fn issue_comment_on_pr_uses_pr_comment_type() {
        let payload = json!({
            "issue": {"number": 7, "pull_request": {"url": "x"}},
            "comment": {"body": "nice work"}
        });
        let info = map_to_activity_info("issue_comment", Some("created"), &payload).unwrap();
        assert_eq!(info.activity_type, "pr_comment.created");
    }

    #[test]
    fn issue_comment_on_issue_uses_issue_comment_type() {
        let payload = json!({
            "issue": {"number": 7, "pull_request": serde_json::Value::Null},
            "comment": {"body": "nice work"}
        });
        let info = map_to_activity_info("issue_comment", Some("created"), &payload).unwrap();
        assert_eq!(info.activity_type, "issue_comment.created");
    }

    #[test]
    fn push_title_counts_commits() {
        let payload = json!({
            "ref": "refs/heads/main",
            "commits": [{"message": "feat: init"}, {"message": "fix"}]
        });
        let info = map_to_activity_info("push", None, &payload).unwrap();
        assert_eq!(info.title, "Pushed 2 commits to main");
        assert_eq!(info.description.as_deref(), Some("feat: init"));
        assert!(info.entity_number.is_none());
    }

    #[test]
    fn check_run_only_maps_on_completed() {
        let payload = json!({"check_run": {"conclusion": "failure", "name": "ci"}});
        assert!(map_to_activity_info("check_run", Some("created"), &payload).is_none());
        let info = map_to_activity_info("check_run", Some("completed"), &payload).unwrap();
        assert_eq!(info.activity_type, "check_run.failure");
    }

    #[test]
    fn unmapped_event_yields_no_entry() {
        assert!(map_to_activity_info("installation", Some("created"), &json!({})).is_none());
    }
}
