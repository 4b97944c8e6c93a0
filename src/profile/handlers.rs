use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        State,
    },
    routing::{patch, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    avatar::{ingest_avatar, AvatarFile, AVATAR_BODY_LIMIT},
    dto::{AvatarResponse, ProfileUpdate},
    services::{apply_changes, self_changes},
};
use crate::{auth::extractors::CurrentUser, error::AppError, state::AppState, users::MemberView};

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/profile", patch(update_profile))
}

pub fn avatar_routes() -> Router<AppState> {
    Router::new()
        .route("/profile/upload-avatar", post(upload_avatar))
        .layer(DefaultBodyLimit::max(AVATAR_BODY_LIMIT))
}

#[instrument(skip(state, user, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<MemberView>, AppError> {
    let Json(payload) = payload?;
    let changes = self_changes(payload)?;
    let view = apply_changes(&state, user.id, &changes, None).await?;
    info!(user_id = %user.id, "profile updated");
    Ok(Json(view))
}

/// Multipart field `file`. Other fields are ignored.
#[instrument(skip(state, user, multipart))]
pub async fn upload_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AvatarResponse>, AppError> {
    if state.storage.is_none() {
        return Err(AppError::Unavailable("Image upload is not configured.".into()));
    }
    let mut multipart =
        multipart.map_err(|e| AppError::validation(format!("Invalid upload: {}", e.body_text())))?;

    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Invalid upload: {}", e.body_text())))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let body = field
            .bytes()
            .await
            .map_err(|e| AppError::validation(format!("Invalid upload: {}", e.body_text())))?;
        file = Some(AvatarFile { body, content_type });
        break;
    }

    let url = ingest_avatar(&state, user.id, file).await?;
    Ok(Json(AvatarResponse { url }))
}
