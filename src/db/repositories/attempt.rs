use anyhow::{Context, Result};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set,
};

use crate::entities::login_attempts;

pub struct AttemptRepository {
    conn: DatabaseConnection,
}

impl AttemptRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn record(&self, ip: &str, login: &str, time: &str) -> Result<()> {
        let attempt = login_attempts::ActiveModel {
            ip_address: Set(ip.to_string()),
            login: Set(login.to_string()),
            time: Set(time.to_string()),
            ..Default::default()
        };

        login_attempts::Entity::insert(attempt)
            .exec(&self.conn)
            .await
            .context("Failed to record login attempt")?;

        Ok(())
    }

    /// Deletes attempts matching this (ip, login) pair, and prunes rows
    /// older than `cutoff` regardless of who they belong to. One DELETE,
    /// disjunctive on purpose.
    pub async fn clear(&self, ip: &str, login: &str, cutoff: &str) -> Result<u64> {
        let result = login_attempts::Entity::delete_many()
            .filter(
                Condition::any()
                    .add(
                        Condition::all()
                            .add(login_attempts::Column::IpAddress.eq(ip))
                            .add(login_attempts::Column::Login.eq(login)),
                    )
                    .add(login_attempts::Column::Time.lt(cutoff)),
            )
            .exec(&self.conn)
            .await
            .context("Failed to clear login attempts")?;

        Ok(result.rows_affected)
    }

    /// Counts attempts from this address OR for this login; a login-only
    /// match from another address also counts.
    pub async fn count(&self, ip: &str, login: Option<&str>) -> Result<u64> {
        let mut condition = Condition::any().add(login_attempts::Column::IpAddress.eq(ip));

        if let Some(login) = login.filter(|l| !l.is_empty()) {
            condition = condition.add(login_attempts::Column::Login.eq(login));
        }

        login_attempts::Entity::find()
            .filter(condition)
            .count(&self.conn)
            .await
            .context("Failed to count login attempts")
    }

    /// Age-only prune, used by the maintenance sweep.
    pub async fn purge_older_than(&self, cutoff: &str) -> Result<u64> {
        let result = login_attempts::Entity::delete_many()
            .filter(login_attempts::Column::Time.lt(cutoff))
            .exec(&self.conn)
            .await
            .context("Failed to purge login attempts")?;

        Ok(result.rows_affected)
    }
}
