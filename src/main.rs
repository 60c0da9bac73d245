use axum::{middleware as axum_mw, routing::post, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod activity;
mod bootstrap;
mod config;
mod error;
mod github;
mod handlers;
mod ingestion;
mod middleware;
mod models;
mod ondemand;
mod ops;
mod pr_files;
mod processor;
mod projections;
mod queries;
mod routes;
mod scheduler;
mod state;
mod write_ops;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ghmirror_api=debug,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let connect_opts = config
        .database_url
        .parse::<sqlx::postgres::PgConnectOptions>()?
        .statement_cache_capacity(0);
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect_with(connect_opts)
        .await?;

    tracing::info!("connected to database");

    sqlx::raw_sql("CREATE TABLE IF NOT EXISTS _migrations (version INT PRIMARY KEY, applied_at TIMESTAMPTZ DEFAULT now())")
        .execute(&pool)
        .await?;

    let migrations: &[(i32, &str)] = &[(1, include_str!("../migrations/001_init.sql"))];

    for &(version, sql) in migrations {
        let applied: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM _migrations WHERE version = $1)")
            .bind(version)
            .fetch_one(&pool)
            .await
            .unwrap_or(false);
        if !applied {
            sqlx::raw_sql(sql).execute(&pool).await?;
            sqlx::query("INSERT INTO _migrations (version) VALUES ($1)")
                .bind(version)
                .execute(&pool)
                .await?;
            tracing::info!(version, "applied migration");
        }
    }
    tracing::info!("migrations applied");

    let github = Arc::new(github::GitHubClient::new(
        config.github_app_id,
        config.github_app_private_key_pem.clone(),
    )?);
    let config = Arc::new(config);

    scheduler::spawn(pool.clone(), config.clone(), github.clone());

    let state = AppState { pool, config: config.clone(), github };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", axum::routing::get(routes::health::health))
        .route("/webhooks/github", post(routes::webhooks::handle))
        .nest("/api/v1", routes::api_router())
        .with_state(state)
        .layer(axum_mw::from_fn(middleware::security::security_headers))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "ghmirror-api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
