use tracing::info;
use uuid::Uuid;

use super::dto::{MemberUpdate, ProfileUpdate};
use crate::{
    error::{AppError, ResultExt},
    state::AppState,
    users::{MemberView, ProfileChanges, Role, UserStatus},
};

const NOTHING_TO_UPDATE: &str = "No fields to update.";
const UPDATE_FAILED: &str = "Could not update profile.";

/// Absent leaves the name alone; `null` and blank are both rejected.
fn clean_name(name: Option<Option<String>>) -> Result<Option<String>, AppError> {
    match name {
        None => Ok(None),
        Some(n) => {
            let trimmed = n.as_deref().map(str::trim).unwrap_or_default();
            if trimmed.is_empty() {
                return Err(AppError::validation("Name cannot be empty."));
            }
            Ok(Some(trimmed.to_string()))
        }
    }
}

/// Blank and `null` both clear the phone.
fn clean_phone(phone: Option<Option<String>>) -> Option<Option<String>> {
    phone.map(|p| {
        p.map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

fn parse_status(status: &str) -> Result<UserStatus, AppError> {
    status
        .parse()
        .map_err(|_| AppError::validation("Invalid status. Use ACTIVE or INACTIVE."))
}

/// All-or-nothing: one unknown name rejects the whole set.
fn parse_role_set(names: &[String]) -> Result<Vec<Role>, AppError> {
    let mut roles = names
        .iter()
        .map(|n| {
            n.parse::<Role>()
                .map_err(|_| AppError::validation(format!("Invalid role: {n}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    roles.sort();
    roles.dedup();
    Ok(roles)
}

pub fn self_changes(update: ProfileUpdate) -> Result<ProfileChanges, AppError> {
    let changes = ProfileChanges {
        name: clean_name(update.name)?,
        phone: clean_phone(update.phone),
        status: None,
    };
    if changes.is_empty() {
        return Err(AppError::validation(NOTHING_TO_UPDATE));
    }
    Ok(changes)
}

pub fn admin_changes(
    update: MemberUpdate,
) -> Result<(ProfileChanges, Option<Vec<Role>>), AppError> {
    let changes = ProfileChanges {
        name: clean_name(update.name)?,
        phone: clean_phone(update.phone),
        status: update.status.as_deref().map(parse_status).transpose()?,
    };
    let roles = update.roles.as_deref().map(parse_role_set).transpose()?;
    if changes.is_empty() && roles.is_none() {
        return Err(AppError::validation(NOTHING_TO_UPDATE));
    }
    Ok((changes, roles))
}

/// Applies validated changes, then re-reads the profile.
pub async fn apply_changes(
    state: &AppState,
    id: Uuid,
    changes: &ProfileChanges,
    roles: Option<&[Role]>,
) -> Result<MemberView, AppError> {
    let missing = || AppError::not_found("Member not found.");

    if !changes.is_empty() {
        let found = state
            .users
            .update_profile(id, changes)
            .await
            .or_internal(UPDATE_FAILED)?;
        if !found {
            return Err(missing());
        }
    }

    if let Some(roles) = roles {
        let found = state
            .users
            .replace_roles(id, roles)
            .await
            .or_internal(UPDATE_FAILED)?;
        if !found {
            return Err(missing());
        }
        info!(user_id = %id, ?roles, "roles replaced");
    }

    let user = state
        .users
        .find_by_id(id)
        .await
        .or_internal(UPDATE_FAILED)?
        .ok_or_else(missing)?;
    Ok(MemberView::from(user))
}
