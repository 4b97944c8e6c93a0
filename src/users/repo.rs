use async_trait::async_trait;
use uuid::Uuid;

use super::repo_types::{MemberPage, MemberQuery, NewUser, ProfileChanges, Role, User};

#[derive(Debug, thiserror::Error)]
pub enum CreateUserError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Credential store port. Emails passed in are already normalized.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    /// Inserts the profile and its initial role set.
    async fn create(&self, user: NewUser) -> Result<User, CreateUserError>;

    async fn roles_of(&self, id: Uuid) -> anyhow::Result<Option<Vec<Role>>>;

    /// Applies only the fields present in `changes`. Returns `false` if no such user.
    async fn update_profile(&self, id: Uuid, changes: &ProfileChanges) -> anyhow::Result<bool>;

    /// Replaces the whole role set, never merges. Returns `false` if no such user.
    async fn replace_roles(&self, id: Uuid, roles: &[Role]) -> anyhow::Result<bool>;

    async fn set_photo_url(&self, id: Uuid, url: &str) -> anyhow::Result<bool>;

    async fn record_login(&self, id: Uuid) -> anyhow::Result<()>;

    /// Stores a new password hash and consumes the reset code.
    async fn mark_password_reset(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()>;

    /// Password sync after a provider-driven recovery. Returns `false` if no such email.
    async fn set_password_by_email(&self, email: &str, password_hash: &str) -> anyhow::Result<bool>;

    async fn list_members(&self, query: &MemberQuery) -> anyhow::Result<MemberPage>;
}
