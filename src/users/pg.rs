use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    repo::{CreateUserError, UserRepository},
    repo_types::{MemberPage, MemberQuery, MemberView, NewUser, ProfileChanges, Role, User, UserRow},
};

const USER_SELECT: &str = r#"
    SELECT p.id, p.name, p.email, p.cpf_hash, p.password_hash, p.password_reset_code,
           p.status, p.phone, p.photo_url, p.email_verified,
           COALESCE(
               array_agg(r.name ORDER BY r.name) FILTER (WHERE r.name IS NOT NULL),
               '{}'::text[]
           ) AS roles,
           p.created_at, p.updated_at, p.last_login_at, p.last_password_change
      FROM profiles p
      LEFT JOIN profile_roles pr ON pr.profile_id = p.id
      LEFT JOIN roles r ON r.id = pr.role_id
"#;

/// Postgres-backed credential store. Roles live in the `profile_roles` join table.
#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn role_names(roles: &[Role]) -> Vec<String> {
    roles.iter().map(|r| r.as_str().to_string()).collect()
}

/// Escapes LIKE metacharacters so the search term matches literally.
fn like_pattern(q: &str) -> String {
    let mut escaped = String::with_capacity(q.len() + 2);
    escaped.push('%');
    for c in q.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("{USER_SELECT} WHERE p.id = $1 GROUP BY p.id");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find user by id")?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("{USER_SELECT} WHERE p.email = $1 GROUP BY p.id");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .context("find user by email")?;
        row.map(User::try_from).transpose()
    }

    async fn create(&self, user: NewUser) -> Result<User, CreateUserError> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO profiles (name, email, cpf_hash, password_hash, password_reset_code,
                                  status, email_verified, last_password_change)
            VALUES ($1, $2, $3, $4, $5, 'ACTIVE', FALSE, now())
            RETURNING id
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.cpf_hash)
        .bind(&user.password_hash)
        .bind(&user.password_reset_code)
        .fetch_one(&mut *tx)
        .await;

        let id = match inserted {
            Ok(id) => id,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(CreateUserError::DuplicateEmail)
            }
            Err(e) => return Err(anyhow::Error::new(e).context("insert profile").into()),
        };

        sqlx::query(
            r#"
            INSERT INTO profile_roles (profile_id, role_id)
            SELECT $1, id FROM roles WHERE name = ANY($2)
            "#,
        )
        .bind(id)
        .bind(role_names(&user.roles))
        .execute(&mut *tx)
        .await
        .context("insert initial roles")?;

        tx.commit().await.context("commit tx")?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("profile {id} vanished after insert").into())
    }

    async fn roles_of(&self, id: Uuid) -> anyhow::Result<Option<Vec<Role>>> {
        Ok(self.find_by_id(id).await?.map(|u| u.roles))
    }

    async fn update_profile(&self, id: Uuid, changes: &ProfileChanges) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
               SET name = COALESCE($2, name),
                   phone = CASE WHEN $3 THEN $4 ELSE phone END,
                   status = COALESCE($5, status),
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.phone.is_some())
        .bind(changes.phone.clone().flatten())
        .bind(changes.status.map(|s| s.as_str()))
        .execute(&self.db)
        .await
        .context("update profile")?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_roles(&self, id: Uuid, roles: &[Role]) -> anyhow::Result<bool> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let exists =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM profiles WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .context("lock profile")?;
        if exists.is_none() {
            return Ok(false);
        }

        sqlx::query("DELETE FROM profile_roles WHERE profile_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("delete roles")?;

        sqlx::query(
            r#"
            INSERT INTO profile_roles (profile_id, role_id)
            SELECT $1, id FROM roles WHERE name = ANY($2)
            "#,
        )
        .bind(id)
        .bind(role_names(roles))
        .execute(&mut *tx)
        .await
        .context("insert roles")?;

        sqlx::query("UPDATE profiles SET updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("touch profile")?;

        tx.commit().await.context("commit tx")?;
        Ok(true)
    }

    async fn set_photo_url(&self, id: Uuid, url: &str) -> anyhow::Result<bool> {
        let result =
            sqlx::query("UPDATE profiles SET photo_url = $2, updated_at = now() WHERE id = $1")
                .bind(id)
                .bind(url)
                .execute(&self.db)
                .await
                .context("update photo_url")?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_login(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE profiles SET last_login_at = now(), updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("record login")?;
        Ok(())
    }

    async fn mark_password_reset(&self, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE profiles
               SET password_hash = $2,
                   password_reset_code = NULL,
                   last_password_change = now(),
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.db)
        .await
        .context("reset password")?;
        Ok(())
    }

    async fn set_password_by_email(
        &self,
        email: &str,
        password_hash: &str,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
               SET password_hash = $2,
                   last_password_change = now(),
                   updated_at = now()
             WHERE email = $1
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .execute(&self.db)
        .await
        .context("sync password")?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_members(&self, query: &MemberQuery) -> anyhow::Result<MemberPage> {
        let pattern = like_pattern(&query.q);

        let sql = format!(
            "{USER_SELECT} WHERE p.name ILIKE $1 OR p.email ILIKE $1 \
             GROUP BY p.id ORDER BY p.name ASC, p.id ASC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&pattern)
            .bind(query.limit)
            .bind(query.offset())
            .fetch_all(&self.db)
            .await
            .context("list members")?;

        let members = rows
            .into_iter()
            .map(|r| User::try_from(r).map(MemberView::from))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let total = if query.with_count {
            let n = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM profiles p WHERE p.name ILIKE $1 OR p.email ILIKE $1",
            )
            .bind(&pattern)
            .fetch_one(&self.db)
            .await
            .context("count members")?;
            Some(n)
        } else {
            None
        };

        Ok(MemberPage { members, total })
    }
}
