use anyhow::{Context, Result};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::entities::{permissions, role_permissions, roles};

pub struct PermissionRepository {
    conn: DatabaseConnection,
}

impl PermissionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn find_all(&self) -> Result<Vec<permissions::Model>> {
        permissions::Entity::find()
            .all(&self.conn)
            .await
            .context("Failed to query permission catalogue")
    }

    pub async fn find_for_role(&self, role_id: i32) -> Result<Vec<role_permissions::Model>> {
        role_permissions::Entity::find()
            .filter(role_permissions::Column::RoleId.eq(role_id))
            .all(&self.conn)
            .await
            .context("Failed to query role permissions")
    }

    pub async fn find_all_roles(&self) -> Result<Vec<roles::Model>> {
        roles::Entity::find()
            .all(&self.conn)
            .await
            .context("Failed to query roles")
    }
}
