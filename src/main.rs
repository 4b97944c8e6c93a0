mod admin;
mod app;
mod auth;
mod config;
mod error;
mod gallery;
mod profile;
mod state;
mod storage;
mod users;

use crate::{
    config::AppConfig,
    state::{run_migrations, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "ivida=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    tracing::info!(
        environment = ?config.environment,
        recovery = ?config.recovery,
        storage = config.storage.is_some(),
        "configuration loaded"
    );

    let (state, db) = AppState::init(config).await?;

    run_migrations(&db).await?;

    app::serve(app::build_app(state)).await
}
