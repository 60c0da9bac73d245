//! Write-operation log and reconciler (spec.md §4.15).
//!
//! `submit` records an optimistic mutation and plays it against the GitHub
//! REST mutation endpoints using the caller's own token (OAuth/permission
//! evaluation is an external boolean oracle per spec.md §1 — this module
//! trusts whatever token the route handler hands it). `reconcile` is called
//! from the processor's post-success phase (§4.11 step 3) to promote a
//! matching pending/completed row to `confirmed` once the webhook that
//! confirms it actually arrives.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::github::rest::RestClient;
use crate::models::{SubmitWriteOperation, WriteOperation, WriteOperationType};

pub async fn submit(
    pool: &PgPool,
    user_token: String,
    dto: SubmitWriteOperation,
) -> AppResult<WriteOperation> {
    if let Some(existing) = fetch_by_correlation_id(pool, &dto.correlation_id).await? {
        return Ok(existing);
    }

    let (owner_login, name): (String, String) = sqlx::query_as(
        "SELECT owner_login, name FROM repositories WHERE repository_id = $1",
    )
    .bind(dto.repository_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::EntityNotFound)?;

    let id = Uuid::new_v4();
    sqlx::query(
        r#"INSERT INTO write_operations
             (id, correlation_id, operation_type, state, repository_id,
              input_payload, preview_data, created_at, updated_at)
           VALUES ($1, $2, $3, 'pending', $4, $5, $6, now(), now())"#,
    )
    .bind(id)
    .bind(&dto.correlation_id)
    .bind(dto.operation_type.as_str())
    .bind(dto.repository_id)
    .bind(&dto.input_payload)
    .bind(&dto.preview_data)
    .execute(pool)
    .await?;

    let rest = RestClient::new(user_token);
    match execute_mutation(&rest, &owner_login, &name, dto.operation_type, &dto.input_payload).await {
        Ok((entity_number, result_data)) => {
            sqlx::query(
                r#"UPDATE write_operations SET
                     state = 'completed', result_data = $2, github_entity_number = $3,
                     updated_at = now()
                   WHERE id = $1"#,
            )
            .bind(id)
            .bind(result_data)
            .bind(entity_number)
            .execute(pool)
            .await?;
        }
        Err((status, message)) => {
            sqlx::query(
                r#"UPDATE write_operations SET
                     state = 'failed', error_message = $2, error_status = $3,
                     updated_at = now()
                   WHERE id = $1"#,
            )
            .bind(id)
            .bind(&message)
            .bind(status)
            .execute(pool)
            .await?;
        }
    }

    fetch_by_id(pool, id).await?.ok_or(AppError::EntityNotFound)
}

async fn execute_mutation(
    rest: &RestClient,
    owner: &str,
    repo: &str,
    op: WriteOperationType,
    input: &serde_json::Value,
) -> Result<(Option<i32>, serde_json::Value), (Option<i32>, String)> {
    use reqwest::Method;

    let (method, path, body) = match op {
        WriteOperationType::CreateIssue => (
            Method::POST,
            format!("/repos/{owner}/{repo}/issues"),
            serde_json::json!({"title": input["title"], "body": input["body"]}),
        ),
        WriteOperationType::CreateComment => {
            let number = input["issueNumber"].as_i64().unwrap_or(0);
            (
                Method::POST,
                format!("/repos/{owner}/{repo}/issues/{number}/comments"),
                serde_json::json!({"body": input["body"]}),
            )
        }
        WriteOperationType::UpdateIssueState => {
            let number = input["issueNumber"].as_i64().unwrap_or(0);
            (
                Method::PATCH,
                format!("/repos/{owner}/{repo}/issues/{number}"),
                serde_json::json!({"state": input["state"]}),
            )
        }
        WriteOperationType::MergePullRequest => {
            let number = input["pullRequestNumber"].as_i64().unwrap_or(0);
            (Method::PUT, format!("/repos/{owner}/{repo}/pulls/{number}/merge"), serde_json::json!({}))
        }
    };

    let (status, response) = rest
        .send_json(method, &path, &body)
        .await
        .map_err(|e| (None, e.to_string()))?;

    if status >= 400 {
        return Err((Some(status as i32), format!("github returned {status}")));
    }

    let entity_number = response["number"]
        .as_i64()
        .map(|n| n as i32)
        .or_else(|| input["issueNumber"].as_i64().map(|n| n as i32))
        .or_else(|| input["pullRequestNumber"].as_i64().map(|n| n as i32));

    Ok((entity_number, response))
}

pub async fn get_by_correlation_id(pool: &PgPool, correlation_id: &str) -> AppResult<WriteOperation> {
    fetch_by_correlation_id(pool, correlation_id)
        .await?
        .ok_or(AppError::EntityNotFound)
}

async fn fetch_by_correlation_id(pool: &PgPool, correlation_id: &str) -> anyhow::Result<Option<WriteOperation>> {
    Ok(sqlx::query_as("SELECT * FROM write_operations WHERE correlation_id = $1")
        .bind(correlation_id)
        .fetch_optional(pool)
        .await?)
}

async fn fetch_by_id(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<WriteOperation>> {
    Ok(sqlx::query_as("SELECT * FROM write_operations WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

/// `matchWriteOperation` (spec.md §4.15 step 3). Open Question 1 resolved in
/// favor of preferring `merge_pull_request` over `update_issue_state` when
/// `pull_request.closed` carries `merged == true`.
fn match_write_operation(
    event_name: &str,
    action: &str,
    payload: &serde_json::Value,
) -> Option<(WriteOperationType, i32)> {
    match (event_name, action) {
        ("issues", "opened") => {
            let number = payload["issue"]["number"].as_i64()? as i32;
            Some((WriteOperationType::CreateIssue, number))
        }
        ("issue_comment", "created") => {
            let number = payload["issue"]["number"].as_i64()? as i32;
            Some((WriteOperationType::CreateComment, number))
        }
        ("issues", "closed") | ("issues", "reopened") => {
            let number = payload["issue"]["number"].as_i64()? as i32;
            Some((WriteOperationType::UpdateIssueState, number))
        }
        ("pull_request", "closed") => {
            let number = payload["pull_request"]["number"].as_i64()? as i32;
            if payload["pull_request"]["merged"].as_bool() == Some(true) {
                Some((WriteOperationType::MergePullRequest, number))
            } else {
                Some((WriteOperationType::UpdateIssueState, number))
            }
        }
        ("pull_request", "reopened") => {
            let number = payload["pull_request"]["number"].as_i64()? as i32;
            Some((WriteOperationType::UpdateIssueState, number))
        }
        _ => None,
    }
}

/// Reconcile an inbound webhook against any outstanding write operation it
/// confirms. Best-effort: called from the processor's post-success phase
/// and never re-dirties the delivery on failure.
pub async fn reconcile(
    pool: &PgPool,
    repository_id: i64,
    event_name: &str,
    action: &str,
    payload: &serde_json::Value,
) -> anyhow::Result<()> {
    let Some((operation_type, entity_number)) = match_write_operation(event_name, action, payload) else {
        return Ok(());
    };

    let candidates: Vec<(Uuid, String)> = sqlx::query_as(
        r#"SELECT id, state FROM write_operations
           WHERE repository_id = $1 AND operation_type = $2 AND github_entity_number = $3
           ORDER BY created_at DESC LIMIT 5"#,
    )
    .bind(repository_id)
    .bind(operation_type.as_str())
    .bind(entity_number)
    .fetch_all(pool)
    .await?;

    let Some((id, _)) = candidates.into_iter().find(|(_, state)| state == "pending" || state == "completed") else {
        return Ok(());
    };

    sqlx::query("UPDATE write_operations SET state = 'confirmed', updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pull_request_closed_merged_prefers_merge_over_update() {
        let payload = json!({"pull_request": {"number": 9, "merged": true}});
        assert_eq!(
            match_write_operation("pull_request", "closed", &payload),
            Some((WriteOperationType::MergePullRequest, 9))
        );
    }

    #[test]
    fn pull_request_closed_unmerged_is_update_issue_state() {
        let payload = json!({"pull_request": {"number": 9, "merged": false}});
        assert_eq!(
            match_write_operation("pull_request", "closed", &payload),
            Some((WriteOperationType::UpdateIssueState, 9))
        );
    }

    #[test]
    fn issue_opened_matches_create_issue() {
        let payload = json!({"issue": {"number": 7}});
        assert_eq!(
            match_write_operation("issues", "opened", &payload),
            Some((WriteOperationType::CreateIssue, 7))
        );
    }

    #[test]
    fn unrelated_event_has_no_match() {
        assert_eq!(match_write_operation("push", "", &json!({})), None);
    }
}
