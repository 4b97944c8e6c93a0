use axum::{
    extract::{FromRef, Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use super::session::{SessionKeys, COOKIE_NAME};
use crate::state::AppState;

pub const PROTECTED_PREFIXES: [&str; 3] = ["/dashboard", "/area-membros", "/perfil"];

pub fn is_protected_path(path: &str) -> bool {
    PROTECTED_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn login_redirect(path: &str) -> Redirect {
    let query = serde_urlencoded::to_string([("next", path)]).unwrap_or_default();
    Redirect::to(&format!("/login?{query}"))
}

/// Token-only check for member-area paths. Never touches the credential store.
pub async fn auth_gate(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if !is_protected_path(&path) {
        return next.run(req).await;
    }

    let Some(token) = jar.get(COOKIE_NAME).map(|c| c.value().to_string()) else {
        debug!(%path, "no session cookie; redirecting to login");
        return login_redirect(&path).into_response();
    };

    let keys = SessionKeys::from_ref(&state);
    if keys.verify(&token).is_none() {
        debug!(%path, "invalid session cookie; clearing and redirecting");
        let jar = jar.add(keys.clear_cookie());
        return (jar, login_redirect(&path)).into_response();
    }

    next.run(req).await
}
