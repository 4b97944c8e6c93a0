use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use crate::auth::{
    password::PasswordCodec,
    recovery::{GoTrueRecovery, RecoveryProvider},
};
use crate::config::{AppConfig, RecoveryMode};
use crate::storage::{Storage, StorageClient};
use crate::users::{pg::PgUserRepository, UserRepository};

/// Explicitly constructed dependencies shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepository>,
    pub passwords: PasswordCodec,
    /// `None` when blob storage is not configured.
    pub storage: Option<Arc<dyn StorageClient>>,
    /// Present only in the recovery-link mode.
    pub recovery: Option<Arc<dyn RecoveryProvider>>,
}

impl AppState {
    /// Connects to Postgres and the blob store. Returns the pool too so `main` can migrate.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, PgPool)> {
        let config = Arc::new(config);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let storage = match &config.storage {
            Some(cfg) => Some(Arc::new(Storage::new(cfg).await?) as Arc<dyn StorageClient>),
            None => None,
        };

        let recovery = match (config.recovery, &config.auth_provider) {
            (RecoveryMode::Link, Some(provider)) => {
                Some(Arc::new(GoTrueRecovery::new(provider)?) as Arc<dyn RecoveryProvider>)
            }
            _ => None,
        };

        let passwords = PasswordCodec::from_config(&config.password)?;
        let users = Arc::new(PgUserRepository::new(db.clone())) as Arc<dyn UserRepository>;

        Ok((
            Self::from_parts(config, users, passwords, storage, recovery),
            db,
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserRepository>,
        passwords: PasswordCodec,
        storage: Option<Arc<dyn StorageClient>>,
        recovery: Option<Arc<dyn RecoveryProvider>>,
    ) -> Self {
        Self {
            config,
            users,
            passwords,
            storage,
            recovery,
        }
    }
}

/// Applies pending migrations. A failure aborts startup.
pub async fn run_migrations(db: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run database migrations")?;
    tracing::info!("database migrations applied");
    Ok(())
}
