//! Processor — delivery state machine (spec.md §4.2).
//!
//! `process_delivery` is the single-delivery operation; `process_all_pending`
//! and `promote_retry_events` are the two batch operations the scheduler
//! (§5) drives on independent cadences. Post-success side effects (§4.11)
//! run after the terminal write and are best-effort — a failure there is
//! logged and never reopens the delivery.

use std::time::Duration;

use rand::Rng;
use sqlx::PgPool;

use crate::config::Config;
use crate::github::rest::RestClient;
use crate::models::RawWebhookDelivery;
use crate::{activity, handlers, pr_files, projections, write_ops};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Absent,
    AlreadyProcessed,
    Processed,
    Retried,
    DeadLettered,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

/// `nextRetryAt = now + BASE_BACKOFF * 2^(attempt-1) + jitter`, jitter
/// uniform in `[0, 0.25 * exponential)`.
fn backoff_with_jitter(base: Duration, attempt: i32) -> Duration {
    let exponential = base.as_millis() as u64 * 2u64.saturating_pow((attempt - 1).max(0) as u32);
    let jitter_bound = (exponential as f64 * 0.25) as u64;
    let jitter = if jitter_bound == 0 {
        0
    } else {
        rand::rng().random_range(0..jitter_bound)
    };
    Duration::from_millis(exponential + jitter)
}

async fn fetch_row(pool: &PgPool, delivery_id: &str) -> anyhow::Result<Option<RawWebhookDelivery>> {
    Ok(sqlx::query_as("SELECT * FROM raw_webhook_deliveries WHERE delivery_id = $1")
        .bind(delivery_id)
        .fetch_optional(pool)
        .await?)
}

/// Run the per-event handler and, on success, the best-effort §4.11 chain.
/// Returns the handler's own error unchanged — post-success failures never
/// surface here.
async fn run_handler_and_post_success(
    pool: &PgPool,
    rest: Option<&RestClient>,
    repository_id: i64,
    row: &RawWebhookDelivery,
) -> anyhow::Result<()> {
    // Installations/repositories are created on first webhook (spec.md §3
    // Lifecycle) — every handler below assumes the repository row exists.
    handlers::common::ensure_installation(pool, &row.payload_json).await?;
    handlers::common::ensure_repository(pool, &row.payload_json, row.installation_id).await?;

    handlers::dispatch(pool, repository_id, &row.event_name, row.action.as_deref(), &row.payload_json).await?;

    let action = row.action.as_deref().unwrap_or("");

    if let Some(info) = activity::map_to_activity_info(&row.event_name, row.action.as_deref(), &row.payload_json) {
        if let Err(err) = activity::append_entry(pool, repository_id, info).await {
            tracing::warn!(delivery_id = %row.delivery_id, error = %err, "activity append failed (best-effort)");
        }
    }

    if let Err(err) = projections::update_all_projections(pool, repository_id).await {
        tracing::warn!(delivery_id = %row.delivery_id, error = %err, "projection refresh failed (best-effort)");
    }

    if row.event_name == "pull_request"
        && matches!(action, "opened" | "synchronize" | "reopened")
    {
        if let Some(rest) = rest {
            if let Some(target) = build_sync_target(pool, repository_id, &row.payload_json).await {
                let outcome = pr_files::sync(pool, rest, &target).await;
                tracing::debug!(
                    delivery_id = %row.delivery_id,
                    file_count = outcome.file_count,
                    truncated_patches = outcome.truncated_patches,
                    "pr file sync scheduled from post-success"
                );
            }
        }
    }

    if let Err(err) = write_ops::reconcile(pool, repository_id, &row.event_name, action, &row.payload_json).await {
        tracing::warn!(delivery_id = %row.delivery_id, error = %err, "write-op reconciliation failed (best-effort)");
    }

    Ok(())
}

async fn build_sync_target(
    pool: &PgPool,
    repository_id: i64,
    payload: &serde_json::Value,
) -> Option<pr_files::SyncTarget> {
    let number = payload["pull_request"]["number"].as_i64()? as i32;
    let head_sha = payload["pull_request"]["head"]["sha"].as_str()?.to_string();
    let (owner_login, name): (String, String) = sqlx::query_as(
        "SELECT owner_login, name FROM repositories WHERE repository_id = $1",
    )
    .bind(repository_id)
    .fetch_optional(pool)
    .await
    .ok()??;

    Some(pr_files::SyncTarget { owner_login, name, repository_id, pull_request_number: number, head_sha })
}

/// Single-delivery operation (spec.md §4.2). `rest` is optional: callers
/// that only drain the queue (no PR-file side effects needed, e.g. tests)
/// may pass `None` and post-success step 3 silently skips the file sync.
pub async fn process_delivery(
    pool: &PgPool,
    config: &Config,
    rest: Option<&RestClient>,
    delivery_id: &str,
) -> anyhow::Result<ProcessOutcome> {
    let Some(row) = fetch_row(pool, delivery_id).await? else {
        return Ok(ProcessOutcome::Absent);
    };

    if row.process_state == "processed" {
        return Ok(ProcessOutcome::AlreadyProcessed);
    }

    let Some(repository_id) = row.repository_id else {
        // No repository coordinates: nothing to dispatch. Still counts as a
        // real attempt so the §8 invariant (process_attempts strictly
        // increases on every call) holds uniformly.
        sqlx::query(
            r#"UPDATE raw_webhook_deliveries SET
                 process_state = 'processed', process_attempts = process_attempts + 1
               WHERE delivery_id = $1"#,
        )
        .bind(delivery_id)
        .execute(pool)
        .await?;
        return Ok(ProcessOutcome::Processed);
    };

    let next_attempt = row.process_attempts + 1;

    match run_handler_and_post_success(pool, rest, repository_id, &row).await {
        Ok(()) => {
            sqlx::query(
                r#"UPDATE raw_webhook_deliveries SET
                     process_state = 'processed', process_attempts = $2, process_error = NULL
                   WHERE delivery_id = $1"#,
            )
            .bind(delivery_id)
            .bind(next_attempt)
            .execute(pool)
            .await?;
            Ok(ProcessOutcome::Processed)
        }
        Err(err) => {
            if next_attempt >= config.max_attempts {
                let mut tx = pool.begin().await?;
                sqlx::query(
                    r#"INSERT INTO dead_letters
                         (id, delivery_id, event_name, action, installation_id,
                          repository_id, payload_json, reason, created_at)
                       VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, now())"#,
                )
                .bind(delivery_id)
                .bind(&row.event_name)
                .bind(&row.action)
                .bind(row.installation_id)
                .bind(row.repository_id)
                .bind(&row.payload_json)
                .bind(format!("Exhausted {next_attempt} attempts: {err}"))
                .execute(&mut *tx)
                .await?;

                sqlx::query("DELETE FROM raw_webhook_deliveries WHERE delivery_id = $1")
                    .bind(delivery_id)
                    .execute(&mut *tx)
                    .await?;

                tx.commit().await?;
                tracing::warn!(delivery_id, attempts = next_attempt, error = %err, "delivery dead-lettered");
                Ok(ProcessOutcome::DeadLettered)
            } else {
                let delay = backoff_with_jitter(config.base_backoff, next_attempt);
                let next_retry_at = chrono::Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);

                sqlx::query(
                    r#"UPDATE raw_webhook_deliveries SET
                         process_state = 'retry', process_error = $2,
                         process_attempts = $3, next_retry_at = $4
                       WHERE delivery_id = $1"#,
                )
                .bind(delivery_id)
                .bind(err.to_string())
                .bind(next_attempt)
                .bind(next_retry_at)
                .execute(pool)
                .await?;

                Ok(ProcessOutcome::Retried)
            }
        }
    }
}

/// Batch operation: drains up to `BATCH_SIZE` pending rows, oldest first.
pub async fn process_all_pending(
    pool: &PgPool,
    config: &Config,
    rest: Option<&RestClient>,
) -> anyhow::Result<BatchSummary> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT delivery_id FROM raw_webhook_deliveries WHERE process_state = 'pending' ORDER BY received_at LIMIT $1",
    )
    .bind(config.batch_size)
    .fetch_all(pool)
    .await?;

    let mut summary = BatchSummary::default();
    for id in &ids {
        match process_delivery(pool, config, rest, id).await {
            Ok(ProcessOutcome::Processed) => summary.processed += 1,
            Ok(ProcessOutcome::Retried) => summary.retried += 1,
            Ok(ProcessOutcome::DeadLettered) => summary.dead_lettered += 1,
            Ok(_) => {}
            Err(err) => tracing::error!(delivery_id = %id, error = %err, "process_delivery failed unexpectedly"),
        }
    }

    tracing::info!(
        processed = summary.processed,
        retried = summary.retried,
        dead_lettered = summary.dead_lettered,
        batch_size = ids.len(),
        "processed pending batch"
    );

    Ok(summary)
}

/// Retry promotion (spec.md §4.2): the only path that drains the retry
/// queue, run on a periodic schedule at or faster than `BASE_BACKOFF`.
pub async fn promote_retry_events(pool: &PgPool, config: &Config) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"UPDATE raw_webhook_deliveries SET process_state = 'pending', next_retry_at = NULL
           WHERE delivery_id IN (
             SELECT delivery_id FROM raw_webhook_deliveries
             WHERE process_state = 'retry' AND next_retry_at <= now()
             ORDER BY next_retry_at LIMIT $1
           )"#,
    )
    .bind(config.batch_size)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_with_jitter_bounded() {
        let base = Duration::from_secs(1);
        for attempt in 1..5 {
            let d = backoff_with_jitter(base, attempt);
            let exponential = base.as_millis() as u64 * 2u64.pow((attempt - 1) as u32);
            assert!(d.as_millis() as u64 >= exponential);
            assert!(d.as_millis() as u64 <= exponential + (exponential as f64 * 0.25) as u64);
        }
    }
}
