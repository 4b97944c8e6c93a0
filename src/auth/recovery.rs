use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::config::AuthProviderConfig;

/// Hosted auth provider used by the recovery-link variant of password reset.
#[async_trait]
pub trait RecoveryProvider: Send + Sync {
    /// Asks the provider to email a recovery link that lands on `redirect_to`.
    async fn send_recovery_link(&self, email: &str, redirect_to: &str) -> anyhow::Result<()>;

    /// Email bound to a provider recovery session, or `None` if the session is invalid.
    async fn session_email(&self, access_token: &str) -> anyhow::Result<Option<String>>;
}

/// GoTrue-compatible REST client (`/auth/v1/recover`, `/auth/v1/user`).
pub struct GoTrueRecovery {
    http: Client,
    base_url: String,
    service_key: String,
}

#[derive(Deserialize)]
struct ProviderUser {
    email: Option<String>,
}

impl GoTrueRecovery {
    pub fn new(cfg: &AuthProviderConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("ivida/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            service_key: cfg.service_key.clone(),
        })
    }
}

#[async_trait]
impl RecoveryProvider for GoTrueRecovery {
    async fn send_recovery_link(&self, email: &str, redirect_to: &str) -> anyhow::Result<()> {
        self.http
            .post(format!("{}/auth/v1/recover", self.base_url))
            .query(&[("redirect_to", redirect_to)])
            .header("apikey", &self.service_key)
            .json(&json!({ "email": email }))
            .send()
            .await
            .context("recover request")?
            .error_for_status()
            .context("recover response")?;
        Ok(())
    }

    async fn session_email(&self, access_token: &str) -> anyhow::Result<Option<String>> {
        let res = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.service_key)
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .await
            .context("user request")?;

        if matches!(res.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Ok(None);
        }
        let user: ProviderUser = res
            .error_for_status()
            .context("user response")?
            .json()
            .await
            .context("decode provider user")?;
        Ok(user.email)
    }
}
