//! Control-plane rows: installations, repositories, the raw delivery log,
//! dead letters, sync jobs, and the write-operation log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ─── Installation ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Installation {
    pub id: Uuid,
    pub installation_id: i64,
    pub account_login: String,
    pub account_kind: String, // "User" | "Organization"
    pub suspended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Repository ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Repository {
    pub id: Uuid,
    pub repository_id: i64,
    pub installation_id: i64,
    pub owner_login: String,
    pub name: String,
    pub full_name: String,
    pub visibility: String, // "public" | "private" | "internal"
    pub default_branch: String,
    pub archived: bool,
    pub disabled: bool,
    pub is_fork: bool,
    pub pushed_at: Option<DateTime<Utc>>,
    pub github_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Raw webhook delivery ──────────────────────────────
//
// `process_state` is a plain `TEXT` column ("pending" | "retry" |
// "processed" | "failed") checked and set as string literals throughout
// `processor.rs`/`ops.rs`, matching how the teacher reads and writes its
// own status-like columns.

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RawWebhookDelivery {
    pub delivery_id: String,
    pub event_name: String,
    pub action: Option<String>,
    pub installation_id: Option<i64>,
    pub repository_id: Option<i64>,
    pub signature_valid: bool,
    pub payload_json: serde_json::Value,
    pub received_at: DateTime<Utc>,
    pub process_state: String,
    pub process_attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub process_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRawWebhookDelivery {
    pub delivery_id: String,
    pub event_name: String,
    pub action: Option<String>,
    pub installation_id: Option<i64>,
    pub repository_id: Option<i64>,
    pub signature_valid: bool,
    pub payload_json: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

// ─── Dead letter ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeadLetter {
    pub id: Uuid,
    pub delivery_id: String,
    pub event_name: String,
    pub action: Option<String>,
    pub installation_id: Option<i64>,
    pub repository_id: Option<i64>,
    pub payload_json: serde_json::Value,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

// ─── Sync job ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncJob {
    pub id: Uuid,
    pub lock_key: String,
    pub job_kind: String,
    pub scope: serde_json::Value,
    pub state: String,
    pub attempt_count: i32,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Write operation ────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOperationType {
    CreateIssue,
    CreateComment,
    UpdateIssueState,
    MergePullRequest,
}

impl WriteOperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteOperationType::CreateIssue => "create_issue",
            WriteOperationType::CreateComment => "create_comment",
            WriteOperationType::UpdateIssueState => "update_issue_state",
            WriteOperationType::MergePullRequest => "merge_pull_request",
        }
    }
}

impl std::str::FromStr for WriteOperationType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_issue" => Ok(WriteOperationType::CreateIssue),
            "create_comment" => Ok(WriteOperationType::CreateComment),
            "update_issue_state" => Ok(WriteOperationType::UpdateIssueState),
            "merge_pull_request" => Ok(WriteOperationType::MergePullRequest),
            other => anyhow::bail!("unknown write operation type: {other}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WriteOperation {
    pub id: Uuid,
    pub correlation_id: String,
    pub operation_type: String,
    pub state: String,
    pub repository_id: i64,
    pub input_payload: serde_json::Value,
    pub preview_data: serde_json::Value,
    pub result_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub error_status: Option<i32>,
    pub github_entity_number: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitWriteOperation {
    pub correlation_id: String,
    pub operation_type: WriteOperationType,
    pub repository_id: i64,
    pub input_payload: serde_json::Value,
    pub preview_data: serde_json::Value,
}
