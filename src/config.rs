//! Environment-derived configuration, collected in one place instead of
//! scattered `std::env::var` calls — the teacher reads env vars inline in
//! `main.rs`, but this crate's config surface (retry tuning, batch sizes,
//! bootstrap page sizes) is large enough to warrant a struct.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub github_app_id: u64,
    pub github_app_private_key_pem: Vec<u8>,
    pub github_webhook_secret: String,

    /// §4.2 constants.
    pub max_attempts: i32,
    pub base_backoff: Duration,
    pub batch_size: i64,

    /// §4.13/§4.14 constants.
    pub max_files_per_pr: usize,
    pub max_patch_bytes: usize,
    pub bootstrap_chunk_size: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "4000".into())
            .parse()?;

        let github_app_id: u64 = std::env::var("GITHUB_APP_ID")
            .map_err(|_| anyhow::anyhow!("GITHUB_APP_ID not set"))?
            .parse()
            .map_err(|_| anyhow::anyhow!("GITHUB_APP_ID must be a number"))?;

        let private_key_b64 = std::env::var("GITHUB_APP_PRIVATE_KEY")
            .map_err(|_| anyhow::anyhow!("GITHUB_APP_PRIVATE_KEY not set"))?;
        let github_app_private_key_pem = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            private_key_b64.trim(),
        )
        .map_err(|e| anyhow::anyhow!("failed to base64-decode GITHUB_APP_PRIVATE_KEY: {e}"))?;

        let github_webhook_secret = std::env::var("GITHUB_WEBHOOK_SECRET")
            .map_err(|_| anyhow::anyhow!("GITHUB_WEBHOOK_SECRET not set"))?;

        Ok(Self {
            database_url,
            port,
            github_app_id,
            github_app_private_key_pem,
            github_webhook_secret,
            max_attempts: 5,
            base_backoff: Duration::from_secs(1),
            batch_size: 50,
            max_files_per_pr: 300,
            max_patch_bytes: 100_000,
            bootstrap_chunk_size: 50,
        })
    }
}
