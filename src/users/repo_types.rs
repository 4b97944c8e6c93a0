use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Closed role vocabulary. Stored by name in the `roles` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Member,
    Pastor,
    Seminarian,
    Intercessor,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Member,
        Role::Pastor,
        Role::Seminarian,
        Role::Intercessor,
    ];

    /// Assigned at registration.
    pub const DEFAULT: Role = Role::Member;

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Member => "Member",
            Role::Pastor => "Pastor",
            Role::Seminarian => "Seminarian",
            Role::Intercessor => "Intercessor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown role `{s}`"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Inactive => "INACTIVE",
        }
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(UserStatus::Active),
            "INACTIVE" => Ok(UserStatus::Inactive),
            other => Err(format!("unknown status `{other}`")),
        }
    }
}

/// Full account record including credential columns. Never serialized.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub cpf_hash: Option<String>,
    pub password_hash: String,
    pub password_reset_code: Option<String>,
    pub status: UserStatus,
    pub phone: Option<String>,
    pub photo_url: Option<String>,
    pub email_verified: bool,
    pub roles: Vec<Role>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub last_login_at: Option<OffsetDateTime>,
    pub last_password_change: Option<OffsetDateTime>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Row shape of `profiles` joined with aggregated role names.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub cpf_hash: Option<String>,
    pub password_hash: String,
    pub password_reset_code: Option<String>,
    pub status: String,
    pub phone: Option<String>,
    pub photo_url: Option<String>,
    pub email_verified: bool,
    pub roles: Vec<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub last_login_at: Option<OffsetDateTime>,
    pub last_password_change: Option<OffsetDateTime>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            cpf_hash: r.cpf_hash,
            password_hash: r.password_hash,
            password_reset_code: r.password_reset_code,
            status: r.status.parse().map_err(anyhow::Error::msg)?,
            phone: r.phone,
            photo_url: r.photo_url,
            email_verified: r.email_verified,
            roles: parse_roles(&r.roles),
            created_at: r.created_at,
            updated_at: r.updated_at,
            last_login_at: r.last_login_at,
            last_password_change: r.last_password_change,
        })
    }
}

/// Unknown role names in storage are dropped rather than failing the read.
pub fn parse_roles(names: &[String]) -> Vec<Role> {
    let mut roles: Vec<Role> = names.iter().filter_map(|n| n.parse().ok()).collect();
    roles.sort();
    roles.dedup();
    roles
}

/// Insert payload for registration.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub cpf_hash: Option<String>,
    pub password_hash: String,
    pub password_reset_code: Option<String>,
    pub roles: Vec<Role>,
}

/// Scalar profile columns touched by a partial update. `None` leaves the column alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    pub name: Option<String>,
    /// `Some(None)` clears the phone.
    pub phone: Option<Option<String>>,
    pub status: Option<UserStatus>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone.is_none() && self.status.is_none()
    }
}

/// Safe projection of a profile returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberView {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub roles: Vec<Role>,
    pub status: UserStatus,
    pub photo_url: Option<String>,
    pub phone: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for MemberView {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            roles: u.roles,
            status: u.status,
            photo_url: u.photo_url,
            phone: u.phone,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Directory search. `q` is already trimmed; empty means no filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberQuery {
    pub q: String,
    pub page: i64,
    pub limit: i64,
    pub with_count: bool,
}

impl MemberQuery {
    /// Saturates for absurd pages, which then simply return no rows.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone)]
pub struct MemberPage {
    pub members: Vec<MemberView>,
    pub total: Option<i64>,
}
