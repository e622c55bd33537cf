use anyhow::{Context, Result};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set};

use crate::entities::user_cookies;

pub struct AutologinRepository {
    conn: DatabaseConnection,
}

impl AutologinRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Number of stored tokens matching this (user, token) pair. Resuming
    /// requires exactly one match; anything else is treated as stale.
    pub async fn matches(&self, user_id: i32, token: &str) -> Result<u64> {
        user_cookies::Entity::find()
            .filter(user_cookies::Column::UserId.eq(user_id))
            .filter(user_cookies::Column::Token.eq(token))
            .count(&self.conn)
            .await
            .context("Failed to look up autologin token")
    }

    pub async fn create(&self, user_id: i32, token: &str, created_on: &str) -> Result<()> {
        let row = user_cookies::ActiveModel {
            user_id: Set(user_id),
            token: Set(token.to_string()),
            created_on: Set(created_on.to_string()),
            ..Default::default()
        };

        user_cookies::Entity::insert(row)
            .exec(&self.conn)
            .await
            .context("Failed to create autologin token")?;

        Ok(())
    }

    /// Replace `old_token` with `new_token` in place. The conditional
    /// UPDATE makes find-and-replace atomic: of two requests racing with
    /// the same stale cookie, only one sees `rows_affected == 1`.
    pub async fn rotate(
        &self,
        user_id: i32,
        old_token: &str,
        new_token: &str,
        created_on: &str,
    ) -> Result<bool> {
        let result = user_cookies::Entity::update_many()
            .col_expr(user_cookies::Column::Token, Expr::value(new_token))
            .col_expr(user_cookies::Column::CreatedOn, Expr::value(created_on))
            .filter(user_cookies::Column::UserId.eq(user_id))
            .filter(user_cookies::Column::Token.eq(old_token))
            .exec(&self.conn)
            .await
            .context("Failed to rotate autologin token")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn delete(&self, user_id: i32, token: &str) -> Result<()> {
        user_cookies::Entity::delete_many()
            .filter(user_cookies::Column::UserId.eq(user_id))
            .filter(user_cookies::Column::Token.eq(token))
            .exec(&self.conn)
            .await
            .context("Failed to delete autologin token")?;

        Ok(())
    }

    pub async fn purge_older_than(&self, cutoff: &str) -> Result<u64> {
        let result = user_cookies::Entity::delete_many()
            .filter(user_cookies::Column::CreatedOn.lt(cutoff))
            .exec(&self.conn)
            .await
            .context("Failed to purge autologin tokens")?;

        Ok(result.rows_affected)
    }
}
