use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    repo::{CreateUserError, UserRepository},
    repo_types::{
        MemberPage, MemberQuery, MemberView, NewUser, ProfileChanges, Role, User, UserStatus,
    },
};

/// In-process store for tests.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct access for test setup.
    pub fn insert(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }

    fn with_user<R>(&self, id: Uuid, f: impl FnOnce(&mut User) -> R) -> Option<R> {
        let mut users = self.users.lock().unwrap();
        users.get_mut(&id).map(|u| {
            let out = f(u);
            u.updated_at = OffsetDateTime::now_utc();
            out
        })
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.get(id))
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User, CreateUserError> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == new.email) {
            return Err(CreateUserError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let mut roles = new.roles;
        roles.sort();
        roles.dedup();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            cpf_hash: new.cpf_hash,
            password_hash: new.password_hash,
            password_reset_code: new.password_reset_code,
            status: UserStatus::Active,
            phone: None,
            photo_url: None,
            email_verified: false,
            roles,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            last_password_change: Some(now),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn roles_of(&self, id: Uuid) -> anyhow::Result<Option<Vec<Role>>> {
        Ok(self.get(id).map(|u| u.roles))
    }

    async fn update_profile(&self, id: Uuid, changes: &ProfileChanges) -> anyhow::Result<bool> {
        Ok(self
            .with_user(id, |u| {
                if let Some(name) = &changes.name {
                    u.name = name.clone();
                }
                if let Some(phone) = &changes.phone {
                    u.phone = phone.clone();
                }
                if let Some(status) = changes.status {
                    u.status = status;
                }
            })
            .is_some())
    }

    async fn replace_roles(&self, id: Uuid, roles: &[Role]) -> anyhow::Result<bool> {
        let mut roles = roles.to_vec();
        roles.sort();
        roles.dedup();
        Ok(self.with_user(id, |u| u.roles = roles).is_some())
    }

    async fn set_photo_url(&self, id: Uuid, url: &str) -> anyhow::Result<bool> {
        Ok(self.with_user(id, |u| u.photo_url = Some(url.to_string())).is_some())
    }

    async fn record_login(&self, id: Uuid) -> anyhow::Result<()> {
        self.with_user(id, |u| u.last_login_at = Some(OffsetDateTime::now_utc()));
        Ok(())
    }

    async fn mark_password_reset(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        self.with_user(id, |u| {
            u.password_hash = password_hash.to_string();
            u.password_reset_code = None;
            u.last_password_change = Some(OffsetDateTime::now_utc());
        });
        Ok(())
    }

    async fn set_password_by_email(
        &self,
        email: &str,
        password_hash: &str,
    ) -> anyhow::Result<bool> {
        let id = self.find_by_email(email).await?.map(|u| u.id);
        Ok(match id {
            Some(id) => self
                .with_user(id, |u| {
                    u.password_hash = password_hash.to_string();
                    u.last_password_change = Some(OffsetDateTime::now_utc());
                })
                .is_some(),
            None => false,
        })
    }

    async fn list_members(&self, query: &MemberQuery) -> anyhow::Result<MemberPage> {
        let needle = query.q.to_lowercase();
        let mut matched: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| {
                u.name.to_lowercase().contains(&needle) || u.email.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        let total = query.with_count.then_some(matched.len() as i64);
        let members = matched
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .map(MemberView::from)
            .collect();
        Ok(MemberPage { members, total })
    }
}
