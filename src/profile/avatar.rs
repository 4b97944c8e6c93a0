use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, ResultExt},
    state::AppState,
};

/// 2 MiB. Exactly this many bytes is accepted.
pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

/// Body limit for the upload route; above `MAX_AVATAR_BYTES` so the size check is ours.
pub const AVATAR_BODY_LIMIT: usize = 3 * 1024 * 1024;

const CLEANUP_LIST_LIMIT: i32 = 1000;

pub struct AvatarFile {
    pub body: Bytes,
    pub content_type: Option<String>,
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct.to_ascii_lowercase().as_str() {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

pub fn avatar_prefix(user_id: Uuid) -> String {
    format!("profile-images/{user_id}/")
}

/// Validates, stores and links a new avatar, then drops the user's older avatar objects.
/// Returns the public URL now stored as `photo_url`.
pub async fn ingest_avatar(
    state: &AppState,
    user_id: Uuid,
    file: Option<AvatarFile>,
) -> Result<String, AppError> {
    let storage = state
        .storage
        .clone()
        .ok_or_else(|| AppError::Unavailable("Image upload is not configured.".into()))?;

    let file = file.ok_or_else(|| AppError::validation("No file was sent."))?;
    if file.body.len() > MAX_AVATAR_BYTES {
        return Err(AppError::validation("Image must be at most 2 MB."));
    }
    let content_type = file.content_type.unwrap_or_default().to_ascii_lowercase();
    let ext = ext_from_mime(&content_type)
        .ok_or_else(|| AppError::validation("Use a JPEG, PNG or WebP image."))?;

    let prefix = avatar_prefix(user_id);
    let key = format!("{prefix}avatar-{}.{ext}", Uuid::new_v4());
    storage
        .put_object(&key, file.body, &content_type)
        .await
        .or_internal("Could not upload image.")?;

    let url = storage.public_url(&key);
    let linked = state
        .users
        .set_photo_url(user_id, &url)
        .await
        .or_internal("Could not save profile photo.")?;
    if !linked {
        return Err(AppError::not_found("Profile not found."));
    }
    info!(%user_id, %key, "avatar updated");

    // Best effort from here on.
    match storage.list_objects(&prefix, CLEANUP_LIST_LIMIT).await {
        Ok(keys) => {
            for old in keys.iter().filter(|k| **k != key) {
                if let Err(e) = storage.delete_object(old).await {
                    warn!(error = %e, %user_id, key = %old, "failed to delete old avatar");
                }
            }
        }
        Err(e) => warn!(error = %e, %user_id, "failed to list old avatars"),
    }

    Ok(url)
}
