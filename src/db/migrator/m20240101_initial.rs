use crate::entities::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

use crate::entities::{permissions, role_permissions, roles, users};
use crate::security;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Role ids referenced by the seed grants below.
const ROLE_ADMINISTRATOR: i32 = 1;
const ROLE_EDITOR: i32 = 2;
const ROLE_USER: i32 = 3;

/// Default admin password; the bootstrap account is expected to change it.
const DEFAULT_ADMIN_PASSWORD: &str = "admin";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Users)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Roles)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Permissions)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(RolePermissions)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(LoginAttempts)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(UserCookies)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Autologin lookups are always by (user_id, token)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_user_cookies_user_token")
                    .table(UserCookies)
                    .col(crate::entities::user_cookies::Column::UserId)
                    .col(crate::entities::user_cookies::Column::Token)
                    .to_owned(),
            )
            .await?;

        seed_roles(manager).await?;
        seed_permissions(manager).await?;
        seed_admin_user(manager).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserCookies).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LoginAttempts).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RolePermissions).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Permissions).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Roles).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users).to_owned())
            .await?;

        Ok(())
    }
}

async fn seed_roles(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    let rows = [
        (ROLE_ADMINISTRATOR, "Administrator", "Full site access"),
        (ROLE_EDITOR, "Editor", "Content and report access"),
        (ROLE_USER, "User", "Standard member account"),
    ];

    for (role_id, role_name, description) in rows {
        let insert = Query::insert()
            .into_table(Roles)
            .columns([
                roles::Column::RoleId,
                roles::Column::RoleName,
                roles::Column::Description,
            ])
            .values_panic([role_id.into(), role_name.into(), description.into()])
            .to_owned();

        manager.exec_stmt(insert).await?;
    }

    Ok(())
}

async fn seed_permissions(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    let catalogue = [
        (1, "Site.Signin.Allow"),
        (2, "Site.Content.View"),
        (3, "Site.Reports.View"),
        (4, "Site.Settings.View"),
        (5, "Site.Developer.View"),
    ];

    for (permission_id, name) in catalogue {
        let insert = Query::insert()
            .into_table(Permissions)
            .columns([
                permissions::Column::PermissionId,
                permissions::Column::Name,
            ])
            .values_panic([permission_id.into(), name.into()])
            .to_owned();

        manager.exec_stmt(insert).await?;
    }

    let grants = [
        (ROLE_ADMINISTRATOR, 1),
        (ROLE_ADMINISTRATOR, 2),
        (ROLE_ADMINISTRATOR, 3),
        (ROLE_ADMINISTRATOR, 4),
        (ROLE_ADMINISTRATOR, 5),
        (ROLE_EDITOR, 1),
        (ROLE_EDITOR, 2),
        (ROLE_EDITOR, 3),
        (ROLE_USER, 1),
    ];

    for (role_id, permission_id) in grants {
        let insert = Query::insert()
            .into_table(RolePermissions)
            .columns([
                role_permissions::Column::RoleId,
                role_permissions::Column::PermissionId,
            ])
            .values_panic([role_id.into(), permission_id.into()])
            .to_owned();

        manager.exec_stmt(insert).await?;
    }

    Ok(())
}

async fn seed_admin_user(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    let salt = security::generate_salt();
    let password_hash = security::credential_hash(&salt, DEFAULT_ADMIN_PASSWORD);
    let now = security::format_timestamp(chrono::Utc::now());

    let insert = Query::insert()
        .into_table(Users)
        .columns([
            users::Column::Username,
            users::Column::Email,
            users::Column::RoleId,
            users::Column::Salt,
            users::Column::PasswordHash,
            users::Column::Active,
            users::Column::Deleted,
            users::Column::Banned,
            users::Column::CreatedAt,
        ])
        .values_panic([
            "admin".into(),
            "admin@localhost".into(),
            ROLE_ADMINISTRATOR.into(),
            salt.into(),
            password_hash.into(),
            1.into(),
            0.into(),
            false.into(),
            now.into(),
        ])
        .to_owned();

    manager.exec_stmt(insert).await?;

    Ok(())
}
