use axum::{
    extract::{rejection::JsonRejection, FromRef, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            ForgotPasswordRequest, LoginRequest, LoginResponse, LogoutParams, MeResponse, MeUser,
            PublicUser, RegisterRequest, RegisterResponse, ResetPasswordRequest, SuccessResponse,
            SyncPasswordRequest, ValidateResetRequest,
        },
        password::generate_reset_code,
        services::{is_valid_email, normalize_email, validate_password, weak_password_message},
        session::{SessionKeys, COOKIE_NAME},
    },
    config::RecoveryMode,
    error::{AppError, ResultExt},
    state::AppState,
    users::{repo_types::NewUser, CreateUserError, Role, User},
};

const RESET_MISMATCH: &str = "Email, CPF or reset code do not match.";
const RECOVERY_SENT: &str =
    "If an account exists for this email, you will receive a link to reset your password.";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", get(logout))
        .route("/auth/me", get(me))
}

/// Only one recovery variant is mounted at a time.
pub fn recovery_routes(mode: RecoveryMode) -> Router<AppState> {
    match mode {
        RecoveryMode::Code => Router::new()
            .route("/auth/forgot-password/validate", post(validate_reset_code))
            .route("/auth/forgot-password/reset", post(reset_password)),
        RecoveryMode::Link => Router::new()
            .route("/auth/forgot-password", post(forgot_password))
            .route("/auth/sync-password", post(sync_password)),
    }
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, AppError> {
    let Json(payload) = payload?;
    let name = payload.name.trim().to_string();
    let email = normalize_email(&payload.email);

    if name.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(AppError::validation("Name, email and password are required."));
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::validation("Invalid email."));
    }
    if let Err(missing) = validate_password(&payload.password) {
        return Err(AppError::validation(weak_password_message(&missing)));
    }

    // Ensure email is not taken
    let existing = state
        .users
        .find_by_email(&email)
        .await
        .or_internal("Could not create account. Please try again.")?;
    if existing.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("An account with this email already exists.".into()));
    }

    let password_hash = state
        .passwords
        .hash(&payload.password)
        .or_internal("Could not create account. Please try again.")?;
    let reset_code = generate_reset_code();
    let reset_code_hash = state
        .passwords
        .hash(&reset_code)
        .or_internal("Could not create account. Please try again.")?;
    let cpf_hash = payload
        .cpf
        .as_deref()
        .filter(|cpf| cpf.chars().any(|c| c.is_ascii_digit()))
        .map(|cpf| state.passwords.fingerprint(cpf));

    let user = match state
        .users
        .create(NewUser {
            name,
            email,
            cpf_hash,
            password_hash,
            password_reset_code: Some(reset_code_hash),
            roles: vec![Role::DEFAULT],
        })
        .await
    {
        Ok(u) => u,
        Err(CreateUserError::DuplicateEmail) => {
            return Err(AppError::Conflict("An account with this email already exists.".into()))
        }
        Err(CreateUserError::Backend(e)) => {
            return Err(AppError::Internal {
                message: "Could not create account. Please try again.",
                cause: e,
            })
        }
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(Json(RegisterResponse {
        success: true,
        reset_code,
        message: "Account created. Keep the reset code somewhere safe to recover your password."
            .into(),
    }))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let Json(payload) = payload?;
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.password.is_empty() {
        return Err(AppError::validation("Email and password are required."));
    }

    let invalid = || AppError::unauthorized("Incorrect email or password.");

    let user = match state
        .users
        .find_by_email(&email)
        .await
        .or_internal("Could not log in. Please try again.")?
    {
        Some(u) if u.is_active() => u,
        Some(u) => {
            warn!(user_id = %u.id, "login on inactive account");
            return Err(invalid());
        }
        None => {
            warn!(email = %email, "login unknown email");
            return Err(invalid());
        }
    };

    let ok = state
        .passwords
        .verify(&payload.password, &user.password_hash)
        .or_internal("Could not log in. Please try again.")?;
    if !ok {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    if let Err(e) = state.users.record_login(user.id).await {
        warn!(error = %e, user_id = %user.id, "failed to stamp last login");
    }

    let keys = SessionKeys::from_ref(&state);
    let token = keys
        .issue(user.id, &user.email)
        .or_internal("Could not log in. Please try again.")?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok((
        jar.add(keys.cookie(token)),
        Json(LoginResponse {
            success: true,
            user: PublicUser {
                id: user.id,
                name: user.name,
                email: user.email,
            },
        }),
    ))
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<LogoutParams>,
) -> Response {
    let jar = jar.add(SessionKeys::from_ref(&state).clear_cookie());
    if params.no_redirect.as_deref() == Some("1") {
        return (jar, Json(json!({ "ok": true }))).into_response();
    }
    (jar, Redirect::to("/login")).into_response()
}

/// Profile lookup failures degrade to a user without profile fields.
#[instrument(skip(state, jar))]
pub async fn me(State(state): State<AppState>, jar: CookieJar) -> Response {
    let claims = jar
        .get(COOKIE_NAME)
        .and_then(|c| SessionKeys::from_ref(&state).verify(c.value()));

    let user = match claims {
        None => None,
        Some(claims) => {
            let profile = match state.users.find_by_id(claims.sub).await {
                Ok(p) => p,
                Err(e) => {
                    error!(error = %e, user_id = %claims.sub, "profile lookup failed");
                    None
                }
            };
            Some(match profile {
                Some(p) => MeUser {
                    id: claims.sub,
                    email: claims.email,
                    name: Some(p.name),
                    roles: p.roles,
                    photo_url: p.photo_url,
                    phone: p.phone,
                },
                None => MeUser {
                    id: claims.sub,
                    email: claims.email,
                    name: None,
                    roles: Vec::new(),
                    photo_url: None,
                    phone: None,
                },
            })
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    (headers, Json(MeResponse { user })).into_response()
}

async fn find_active(state: &AppState, email: &str) -> Result<Option<User>, AppError> {
    Ok(state
        .users
        .find_by_email(email)
        .await
        .or_internal("Could not validate. Please try again.")?
        .filter(User::is_active))
}

/// Checks email, CPF fingerprint (when one is stored) and reset code without consuming the code.
#[instrument(skip(state, payload))]
pub async fn validate_reset_code(
    State(state): State<AppState>,
    payload: Result<Json<ValidateResetRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let Json(payload) = payload?;
    let email = normalize_email(&payload.email);
    let code = payload.reset_code.trim();
    if email.is_empty() || payload.cpf.trim().is_empty() || code.is_empty() {
        return Err(AppError::validation("Please fill in every field."));
    }

    let user = find_active(&state, &email)
        .await?
        .ok_or_else(|| AppError::unauthorized(RESET_MISMATCH))?;

    if let Some(stored) = &user.cpf_hash {
        if state.passwords.fingerprint(&payload.cpf) != *stored {
            warn!(user_id = %user.id, "reset validation cpf mismatch");
            return Err(AppError::unauthorized(RESET_MISMATCH));
        }
    }

    let code_hash = user
        .password_reset_code
        .as_deref()
        .ok_or_else(|| AppError::unauthorized(RESET_MISMATCH))?;
    let valid = state
        .passwords
        .verify(code, code_hash)
        .or_internal("Could not validate. Please try again.")?;
    if !valid {
        warn!(user_id = %user.id, "reset validation code mismatch");
        return Err(AppError::unauthorized(RESET_MISMATCH));
    }

    Ok(Json(SuccessResponse::ok()))
}

/// Consumes the reset code: a second use with the same code fails with 401.
#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let Json(payload) = payload?;
    let email = normalize_email(&payload.email);
    let code = payload.reset_code.trim();
    if email.is_empty() || code.is_empty() || payload.new_password.is_empty() {
        return Err(AppError::validation("Email, reset code and new password are required."));
    }
    if let Err(missing) = validate_password(&payload.new_password) {
        return Err(AppError::validation(weak_password_message(&missing)));
    }

    let stale = || AppError::unauthorized("Invalid data. Please validate again.");
    let user = find_active(&state, &email).await?.ok_or_else(stale)?;
    let code_hash = user.password_reset_code.as_deref().ok_or_else(stale)?;

    let valid = state
        .passwords
        .verify(code, code_hash)
        .or_internal("Could not change password. Please try again.")?;
    if !valid {
        warn!(user_id = %user.id, "reset with invalid or used code");
        return Err(AppError::unauthorized("Reset code invalid or already used."));
    }

    let password_hash = state
        .passwords
        .hash(&payload.new_password)
        .or_internal("Could not change password. Please try again.")?;
    state
        .users
        .mark_password_reset(user.id, &password_hash)
        .await
        .or_internal("Could not change password. Please try again.")?;

    info!(user_id = %user.id, "password reset with code");
    Ok(Json(SuccessResponse::with_message(
        "Password changed. Log in with your new password.",
    )))
}

fn recovery_redirect(state: &AppState, headers: &HeaderMap) -> String {
    let origin = state.config.app_url.clone().or_else(|| {
        headers
            .get("x-forwarded-host")
            .or_else(|| headers.get(header::HOST))
            .and_then(|h| h.to_str().ok())
            .map(|host| format!("https://{host}"))
    });
    format!("{}/resetar-senha", origin.unwrap_or_default())
}

/// Answers identically whether or not the account exists.
#[instrument(skip(state, headers, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let Json(payload) = payload?;
    let email = normalize_email(&payload.email);
    if email.is_empty() {
        return Err(AppError::validation("Please enter your email."));
    }
    let provider = state
        .recovery
        .clone()
        .ok_or_else(|| AppError::Unavailable("Password recovery is unavailable.".into()))?;

    let account = state
        .users
        .find_by_email(&email)
        .await
        .or_internal("Could not process the request. Please try again.")?
        .filter(User::is_active);

    if let Some(user) = account {
        let redirect_to = recovery_redirect(&state, &headers);
        if let Err(e) = provider.send_recovery_link(&user.email, &redirect_to).await {
            error!(error = %e, user_id = %user.id, "recovery link request failed");
        } else {
            info!(user_id = %user.id, "recovery link requested");
        }
    }

    Ok(Json(SuccessResponse::with_message(RECOVERY_SENT)))
}

/// Stores the new password hash after the provider-driven recovery finished.
#[instrument(skip(state, payload))]
pub async fn sync_password(
    State(state): State<AppState>,
    payload: Result<Json<SyncPasswordRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let Json(payload) = payload?;
    let new_password = payload.new_password.trim();
    if new_password.is_empty()
        || payload.access_token.is_empty()
        || payload.refresh_token.is_empty()
    {
        return Err(AppError::validation("Invalid session or missing password."));
    }
    if let Err(missing) = validate_password(new_password) {
        return Err(AppError::validation(weak_password_message(&missing)));
    }
    let provider = state
        .recovery
        .clone()
        .ok_or_else(|| AppError::Unavailable("Password recovery is unavailable.".into()))?;

    let email = provider
        .session_email(&payload.access_token)
        .await
        .or_internal("Could not update password. Please try again.")?
        .map(|e| normalize_email(&e))
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::unauthorized("Invalid or expired session."))?;

    let password_hash = state
        .passwords
        .hash(new_password)
        .or_internal("Could not update password. Please try again.")?;
    let updated = state
        .users
        .set_password_by_email(&email, &password_hash)
        .await
        .or_internal("Could not update password. Please try again.")?;
    if !updated {
        return Err(AppError::not_found("Account not found."));
    }

    info!(email = %email, "password synced after recovery");
    Ok(Json(SuccessResponse::ok()))
}
