//! Shared Axum state: one pool, one config, one token oracle, cloned cheaply
//! per request via the `Arc`s each field already carries internally.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::github::GitHubClient;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub github: Arc<GitHubClient>,
}
