use axum::extract::FromRef;
use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::SessionClaims;
use crate::state::AppState;

pub const COOKIE_NAME: &str = "ivida_session";

/// Signing material for session tokens plus the cookie attributes that carry them.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: TimeDuration,
    secure_cookie: bool,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        let cfg = &state.config.session;
        Self::new(cfg.secret.as_bytes(), TimeDuration::days(cfg.ttl_days), cfg.secure_cookie)
    }
}

impl SessionKeys {
    pub fn new(secret: &[u8], ttl: TimeDuration, secure_cookie: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
            secure_cookie,
        }
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = SessionClaims {
            sub: user_id,
            email: email.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: (now + self.ttl).unix_timestamp() as usize,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "session token signed");
        Ok(token)
    }

    /// Expired, malformed or mis-signed tokens all yield `None`.
    pub fn verify(&self, token: &str) -> Option<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let claims = decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|e| debug!(error = %e, "session token rejected"))
            .ok()?
            .claims;
        if claims.email.is_empty() {
            return None;
        }
        Some(claims)
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((COOKIE_NAME, token))
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookie)
            .path("/")
            .max_age(self.ttl)
            .build()
    }

    /// Empty value with zero max-age. The token itself stays valid until `exp`.
    pub fn clear_cookie(&self) -> Cookie<'static> {
        Cookie::build((COOKIE_NAME, ""))
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookie)
            .path("/")
            .max_age(TimeDuration::ZERO)
            .build()
    }
}
