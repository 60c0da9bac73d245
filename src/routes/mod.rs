//! Route modules and the top-level router assembly (spec.md §6).

pub mod deliveries;
pub mod health;
pub mod repos;
pub mod webhooks;
pub mod write_ops;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// `/api/v1` — the bounded read surface plus the write-operation and
/// operator routes. The raw webhook endpoint is mounted separately, outside
/// this nest, since it is unauthenticated-by-bearer (HMAC-verified instead).
/// Shares `AppState` with the rest of the app — the caller applies
/// `with_state` once, after nesting, not here.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/repos", get(repos::list_repos))
        .route("/repos/{owner}/{repo}", get(repos::repo_overview))
        .route("/repos/{owner}/{repo}/pulls", get(repos::list_pulls))
        .route("/repos/{owner}/{repo}/pulls/{number}", get(repos::pull_request_detail))
        .route("/repos/{owner}/{repo}/issues", get(repos::list_issues))
        .route("/repos/{owner}/{repo}/issues/{number}", get(repos::issue_detail))
        .route("/repos/{owner}/{repo}/activity", get(repos::list_activity))
        .route("/repos/{owner}/{repo}/reconcile", post(repos::reconcile))
        .route("/write-ops", post(write_ops::submit))
        .route("/write-ops/{correlationId}", get(write_ops::get_by_correlation_id))
        .route("/deliveries/{deliveryId}/replay", post(deliveries::replay))
        .route("/deliveries/retry-failed", post(deliveries::retry_failed))
        .route("/status", get(health::status))
}
