use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub auth: AuthConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Which credential field identifies an account at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginType {
    Username,
    Email,
    Both,
}

impl LoginType {
    /// Label used in validation messages for the missing-credentials case.
    #[must_use]
    pub const fn field_label(self) -> &'static str {
        match self {
            Self::Username => "Username",
            Self::Email => "Email",
            Self::Both => "Username/Email",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Whether accounts sign in with their username, email, or either.
    pub login_type: LoginType,

    /// 0 = identities display as emails, 1 = as usernames,
    /// 2 = as a separately supplied display name.
    pub use_usernames: u8,

    /// Whether "remember me" persistent logins are offered at all.
    pub allow_remember: bool,

    /// Autologin cookie lifetime in seconds.
    pub remember_length: u64,

    /// Whether a per-user login destination is honored after sign-in.
    pub do_login_redirect: bool,

    /// 0 = no activation required, 1 = email-link activation,
    /// 2 = admin approval.
    pub user_activation_method: u8,

    /// Age after which login attempts stop counting and are pruned.
    pub attempt_retention_seconds: i64,

    /// Age after which unused autologin tokens are purged.
    pub autologin_purge_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_type: LoginType::Email,
            use_usernames: 1,
            allow_remember: true,
            remember_length: 60 * 60 * 24 * 14,
            do_login_redirect: true,
            user_activation_method: 0,
            attempt_retention_seconds: 86_400,
            autologin_purge_days: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Event bus buffer size (default: 100)
    pub event_bus_buffer_size: usize,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/wardkeep.db".to_string(),
            log_level: "info".to_string(),
            event_bus_buffer_size: 100,
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on session and autologin cookies.
    /// Default: true for production safety. Set to false for local
    /// development without HTTPS.
    pub secure_cookies: bool,

    /// Session inactivity expiry in minutes.
    pub session_idle_minutes: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 7171,
            cors_allowed_origins: vec![
                "http://localhost:7171".to_string(),
                "http://127.0.0.1:7171".to_string(),
            ],
            secure_cookies: true,
            session_idle_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("wardkeep").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".wardkeep").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.enabled && self.server.port == 0 {
            anyhow::bail!("Server port must be set when the server is enabled");
        }

        if self.auth.use_usernames > 2 {
            anyhow::bail!("auth.use_usernames must be 0, 1 or 2");
        }

        if self.auth.user_activation_method > 2 {
            anyhow::bail!("auth.user_activation_method must be 0, 1 or 2");
        }

        if self.auth.allow_remember && self.auth.remember_length == 0 {
            anyhow::bail!("auth.remember_length must be > 0 when remembering is allowed");
        }

        if self.auth.attempt_retention_seconds <= 0 {
            anyhow::bail!("auth.attempt_retention_seconds must be > 0");
        }

        Ok(())
    }
}
