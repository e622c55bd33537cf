use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::LoginType;
use crate::entities::{permissions, role_permissions, roles, users};

pub mod migrator;
pub mod repositories;

pub use repositories::user::AuthProjection;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn attempt_repo(&self) -> repositories::attempt::AttemptRepository {
        repositories::attempt::AttemptRepository::new(self.conn.clone())
    }

    fn autologin_repo(&self) -> repositories::autologin::AutologinRepository {
        repositories::autologin::AutologinRepository::new(self.conn.clone())
    }

    fn permission_repo(&self) -> repositories::permission::PermissionRepository {
        repositories::permission::PermissionRepository::new(self.conn.clone())
    }

    // ========== User queries ==========

    pub async fn find_user_for_login(
        &self,
        login: &str,
        login_type: LoginType,
    ) -> Result<Option<users::Model>> {
        self.user_repo().find_for_login(login, login_type).await
    }

    pub async fn find_user_by_id(&self, id: i32) -> Result<Option<users::Model>> {
        self.user_repo().find_by_id(id).await
    }

    pub async fn user_auth_projection(&self, id: i32) -> Result<Option<AuthProjection>> {
        self.user_repo().auth_projection(id).await
    }

    pub async fn record_user_login(&self, id: i32, when: &str, ip: &str) -> Result<()> {
        self.user_repo().record_login(id, when, ip).await
    }

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        role_id: i32,
        salt: &str,
        password_hash: &str,
        created_at: &str,
    ) -> Result<i32> {
        self.user_repo()
            .create(username, email, role_id, salt, password_hash, created_at)
            .await
    }

    // ========== Login attempts ==========

    pub async fn record_login_attempt(&self, ip: &str, login: &str, time: &str) -> Result<()> {
        self.attempt_repo().record(ip, login, time).await
    }

    pub async fn clear_login_attempts(&self, ip: &str, login: &str, cutoff: &str) -> Result<u64> {
        self.attempt_repo().clear(ip, login, cutoff).await
    }

    pub async fn count_login_attempts(&self, ip: &str, login: Option<&str>) -> Result<u64> {
        self.attempt_repo().count(ip, login).await
    }

    pub async fn purge_login_attempts_before(&self, cutoff: &str) -> Result<u64> {
        self.attempt_repo().purge_older_than(cutoff).await
    }

    // ========== Autologin tokens ==========

    pub async fn autologin_matches(&self, user_id: i32, token: &str) -> Result<u64> {
        self.autologin_repo().matches(user_id, token).await
    }

    pub async fn create_autologin(&self, user_id: i32, token: &str, created_on: &str) -> Result<()> {
        self.autologin_repo().create(user_id, token, created_on).await
    }

    pub async fn rotate_autologin(
        &self,
        user_id: i32,
        old_token: &str,
        new_token: &str,
        created_on: &str,
    ) -> Result<bool> {
        self.autologin_repo()
            .rotate(user_id, old_token, new_token, created_on)
            .await
    }

    pub async fn delete_autologin(&self, user_id: i32, token: &str) -> Result<()> {
        self.autologin_repo().delete(user_id, token).await
    }

    pub async fn purge_autologins_before(&self, cutoff: &str) -> Result<u64> {
        self.autologin_repo().purge_older_than(cutoff).await
    }

    // ========== Permissions & roles ==========

    pub async fn find_all_permissions(&self) -> Result<Vec<permissions::Model>> {
        self.permission_repo().find_all().await
    }

    pub async fn find_role_permissions(
        &self,
        role_id: i32,
    ) -> Result<Vec<role_permissions::Model>> {
        self.permission_repo().find_for_role(role_id).await
    }

    pub async fn find_all_roles(&self) -> Result<Vec<roles::Model>> {
        self.permission_repo().find_all_roles().await
    }
}
