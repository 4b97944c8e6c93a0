use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use super::session::{SessionKeys, COOKIE_NAME};
use crate::{error::AppError, state::AppState, users::Role};

/// Caller identity with the role set as currently stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub roles: Vec<Role>,
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

/// Cookie → token verification → current roles from the store.
/// Any failure, including a store error or a deleted account, resolves to `None`.
pub async fn resolve(state: &AppState, jar: &CookieJar) -> Option<SessionUser> {
    let token = jar.get(COOKIE_NAME)?.value();
    let claims = SessionKeys::from_ref(state).verify(token)?;

    match state.users.roles_of(claims.sub).await {
        Ok(Some(roles)) => Some(SessionUser {
            id: claims.sub,
            email: claims.email,
            roles,
        }),
        Ok(None) => None,
        Err(e) => {
            error!(error = %e, user_id = %claims.sub, "role lookup failed");
            None
        }
    }
}

/// `Some` only when the resolved caller holds `Admin`.
pub async fn require_admin(state: &AppState, jar: &CookieJar) -> Option<SessionUser> {
    resolve(state, jar).await.filter(SessionUser::is_admin)
}

/// Rejects with 401 when there is no valid session.
pub struct CurrentUser(pub SessionUser);

/// Rejects with 403 unless the caller is an admin.
pub struct AdminUser(pub SessionUser);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        resolve(state, &jar)
            .await
            .map(CurrentUser)
            .ok_or_else(|| AppError::unauthorized("Session not found. Please log in again."))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        require_admin(state, &jar)
            .await
            .map(AdminUser)
            .ok_or(AppError::Forbidden)
    }
}
