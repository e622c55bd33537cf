use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, FromQueryResult,
    QueryFilter, QuerySelect, Set,
};

use crate::config::LoginType;
use crate::entities::users;

/// Narrow column set used by the logged-in check; the full record is only
/// fetched when the caller actually needs it.
#[derive(Debug, Clone, FromQueryResult)]
pub struct AuthProjection {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub salt: String,
    pub password_hash: String,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Find the account a submitted login identifier refers to, honoring
    /// the configured login type. `Both` matches username or email.
    pub async fn find_for_login(
        &self,
        login: &str,
        login_type: LoginType,
    ) -> Result<Option<users::Model>> {
        let query = match login_type {
            LoginType::Username => {
                users::Entity::find().filter(users::Column::Username.eq(login))
            }
            LoginType::Email => users::Entity::find().filter(users::Column::Email.eq(login)),
            LoginType::Both => users::Entity::find().filter(
                Condition::any()
                    .add(users::Column::Username.eq(login))
                    .add(users::Column::Email.eq(login)),
            ),
        };

        query
            .one(&self.conn)
            .await
            .context("Failed to query user for login")
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<users::Model>> {
        users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")
    }

    pub async fn auth_projection(&self, id: i32) -> Result<Option<AuthProjection>> {
        users::Entity::find_by_id(id)
            .select_only()
            .columns([
                users::Column::Id,
                users::Column::Username,
                users::Column::Email,
                users::Column::Salt,
                users::Column::PasswordHash,
            ])
            .into_model::<AuthProjection>()
            .one(&self.conn)
            .await
            .context("Failed to query user auth projection")
    }

    /// Stamp the last successful login time and address onto the account.
    pub async fn record_login(&self, id: i32, when: &str, ip: &str) -> Result<()> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for login stamp")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let mut active: users::ActiveModel = user.into();
        active.last_login = Set(Some(when.to_string()));
        active.last_ip = Set(Some(ip.to_string()));
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn create(
        &self,
        username: &str,
        email: &str,
        role_id: i32,
        salt: &str,
        password_hash: &str,
        created_at: &str,
    ) -> Result<i32> {
        let user = users::ActiveModel {
            username: Set(username.to_string()),
            email: Set(email.to_string()),
            role_id: Set(role_id),
            salt: Set(salt.to_string()),
            password_hash: Set(password_hash.to_string()),
            active: Set(1),
            deleted: Set(0),
            banned: Set(false),
            created_at: Set(created_at.to_string()),
            ..Default::default()
        };

        let inserted = user
            .insert(&self.conn)
            .await
            .context("Failed to insert user")?;

        Ok(inserted.id)
    }
}
