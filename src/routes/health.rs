//! Operational surface (spec.md §6): liveness plus a queue-health snapshot
//! an operator dashboard can poll without touching the webhook path.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::AppResult;
use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let table_count: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM information_schema.tables WHERE table_schema = 'public'",
    )
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(serde_json::json!({ "ok": true, "tableCount": table_count })))
}

#[derive(Debug, Serialize)]
struct QueueCounts {
    pending: i64,
    retry: i64,
    failed: i64,
    dead_letters: i64,
    recent_processed_last_hour: i64,
}

#[derive(Debug, Serialize)]
struct ProcessingLag {
    avg_pending_age_seconds: f64,
    max_pending_age_seconds: f64,
    stale_retry_count: i64,
}

#[derive(Debug, Serialize)]
struct WriteOpCounts {
    pending: i64,
    completed: i64,
    failed: i64,
    confirmed: i64,
}

#[derive(Debug, Serialize)]
struct ProjectionCoverage {
    overview_count: i64,
    repo_count: i64,
    all_synced: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    queue: QueueCounts,
    processing_lag: ProcessingLag,
    write_operations: WriteOpCounts,
    projections: ProjectionCoverage,
}

/// Queue health, processing lag, write-op state counts and projection
/// coverage — everything an operator needs to tell "ingesting fine" from
/// "backlog is building" without reading logs.
pub async fn status(State(state): State<AppState>) -> AppResult<Json<StatusReport>> {
    let pool = &state.pool;

    let pending: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM raw_webhook_deliveries WHERE process_state = 'pending'",
    )
    .fetch_one(pool)
    .await?;
    let retry: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM raw_webhook_deliveries WHERE process_state = 'retry'",
    )
    .fetch_one(pool)
    .await?;
    let failed: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM raw_webhook_deliveries WHERE process_state = 'failed'",
    )
    .fetch_one(pool)
    .await?;
    let dead_letters: i64 = sqlx::query_scalar("SELECT count(*) FROM dead_letters")
        .fetch_one(pool)
        .await?;
    let recent_processed_last_hour: i64 = sqlx::query_scalar(
        r#"SELECT count(*) FROM raw_webhook_deliveries
           WHERE process_state = 'processed' AND received_at > now() - interval '1 hour'"#,
    )
    .fetch_one(pool)
    .await?;

    let (avg_pending_age_seconds, max_pending_age_seconds): (Option<f64>, Option<f64>) = sqlx::query_as(
        r#"SELECT
             extract(epoch FROM avg(now() - received_at)),
             extract(epoch FROM max(now() - received_at))
           FROM raw_webhook_deliveries WHERE process_state IN ('pending', 'retry')"#,
    )
    .fetch_one(pool)
    .await?;

    let stale_retry_count: i64 = sqlx::query_scalar(
        r#"SELECT count(*) FROM raw_webhook_deliveries
           WHERE process_state = 'retry' AND next_retry_at < now() - interval '5 minutes'"#,
    )
    .fetch_one(pool)
    .await?;

    let write_op_rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT state, count(*) FROM write_operations GROUP BY state",
    )
    .fetch_all(pool)
    .await?;
    let find_state = |state: &str| {
        write_op_rows
            .iter()
            .find(|(s, _)| s == state)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    };

    let overview_count: i64 = sqlx::query_scalar("SELECT count(*) FROM repo_overviews")
        .fetch_one(pool)
        .await?;
    let repo_count: i64 = sqlx::query_scalar("SELECT count(*) FROM repositories")
        .fetch_one(pool)
        .await?;

    Ok(Json(StatusReport {
        queue: QueueCounts {
            pending,
            retry,
            failed,
            dead_letters,
            recent_processed_last_hour,
        },
        processing_lag: ProcessingLag {
            avg_pending_age_seconds: avg_pending_age_seconds.unwrap_or(0.0),
            max_pending_age_seconds: max_pending_age_seconds.unwrap_or(0.0),
            stale_retry_count,
        },
        write_operations: WriteOpCounts {
            pending: find_state("pending"),
            completed: find_state("completed"),
            failed: find_state("failed"),
            confirmed: find_state("confirmed"),
        },
        projections: ProjectionCoverage {
            overview_count,
            repo_count,
            all_synced: overview_count == repo_count,
        },
    }))
}
