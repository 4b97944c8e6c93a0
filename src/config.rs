use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

const DEV_JWT_SECRET: &str = "ivida-jwt-secret-change-in-production";
const DEV_CPF_HASH_SECRET: &str = "ivida-cpf-hash-secret-change-in-production";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl_days: i64,
    /// Marks the session cookie `Secure`.
    pub secure_cookie: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub m_cost: u32,
    pub t_cost: u32,
    pub cpf_hash_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base URL objects are publicly reachable under, e.g. a CDN in front of the bucket.
    pub public_base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryMode {
    /// Reset code shown once at registration plus CPF check.
    Code,
    /// Recovery link sent by the hosted auth provider.
    Link,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthProviderConfig {
    pub url: String,
    pub service_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub environment: Environment,
    pub session: SessionConfig,
    pub password: PasswordConfig,
    pub storage: Option<StorageConfig>,
    pub public_dir: Option<PathBuf>,
    pub app_url: Option<String>,
    pub recovery: RecoveryMode,
    pub auth_provider: Option<AuthProviderConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let environment = match std::env::var("APP_ENV").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        };

        let session = SessionConfig {
            secret: secret_from_env("JWT_SECRET", DEV_JWT_SECRET, environment)?,
            ttl_days: 7,
            secure_cookie: environment.is_production(),
        };

        let defaults = argon2::Params::default();
        let password = PasswordConfig {
            m_cost: parse_env("PASSWORD_HASH_M_COST").unwrap_or(defaults.m_cost()),
            t_cost: parse_env("PASSWORD_HASH_T_COST").unwrap_or(defaults.t_cost()),
            cpf_hash_secret: secret_from_env("CPF_HASH_SECRET", DEV_CPF_HASH_SECRET, environment)?,
        };

        let storage = match (
            non_empty_env("S3_ENDPOINT"),
            non_empty_env("S3_BUCKET"),
            non_empty_env("S3_ACCESS_KEY"),
            non_empty_env("S3_SECRET_KEY"),
        ) {
            (Some(endpoint), Some(bucket), Some(access_key), Some(secret_key)) => {
                let public_base_url = non_empty_env("S3_PUBLIC_BASE_URL")
                    .unwrap_or_else(|| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));
                Some(StorageConfig {
                    endpoint,
                    bucket,
                    access_key,
                    secret_key,
                    region: non_empty_env("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
                    public_base_url,
                })
            }
            _ => {
                warn!("blob storage not configured; avatar upload disabled");
                None
            }
        };

        let recovery = match std::env::var("PASSWORD_RECOVERY").as_deref() {
            Ok("link") => RecoveryMode::Link,
            Ok("code") | Err(_) => RecoveryMode::Code,
            Ok(other) => anyhow::bail!("PASSWORD_RECOVERY must be `code` or `link`, got `{other}`"),
        };

        let auth_provider = match (
            non_empty_env("AUTH_PROVIDER_URL"),
            non_empty_env("AUTH_PROVIDER_SERVICE_KEY"),
        ) {
            (Some(url), Some(service_key)) => Some(AuthProviderConfig { url, service_key }),
            _ => None,
        };
        if recovery == RecoveryMode::Link && auth_provider.is_none() {
            anyhow::bail!(
                "PASSWORD_RECOVERY=link requires AUTH_PROVIDER_URL and AUTH_PROVIDER_SERVICE_KEY"
            );
        }

        Ok(Self {
            database_url,
            environment,
            session,
            password,
            storage,
            public_dir: non_empty_env("PUBLIC_DIR").map(PathBuf::from),
            app_url: non_empty_env("APP_URL").map(|u| u.trim_end_matches('/').to_string()),
            recovery,
            auth_provider,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

/// Production refuses to start without the secret; elsewhere a fixed dev value is used.
fn secret_from_env(
    key: &str,
    dev_default: &str,
    environment: Environment,
) -> anyhow::Result<String> {
    match non_empty_env(key) {
        Some(v) => Ok(v),
        None if environment.is_production() => {
            anyhow::bail!("{key} must be set in production")
        }
        None => {
            warn!("{key} not set; using development secret");
            Ok(dev_default.to_string())
        }
    }
}
