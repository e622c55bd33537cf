use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: String,

    #[sea_orm(unique)]
    pub email: String,

    pub role_id: i32,

    /// Per-account salt mixed into the password digest
    pub salt: String,

    /// Hex SHA-256 of salt + password
    pub password_hash: String,

    /// 0 = pending activation; meaning depends on the configured
    /// activation method
    pub active: i32,

    /// >= 1 = soft-deleted
    pub deleted: i32,

    pub banned: bool,

    pub ban_message: Option<String>,

    pub last_login: Option<String>,

    pub last_ip: Option<String>,

    /// Per-user post-login redirect override
    pub login_destination: Option<String>,

    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
