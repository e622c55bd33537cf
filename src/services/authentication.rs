//! Domain service for authentication.
//!
//! Handles credential login, session establishment, persistent-login
//! tokens, and login-attempt tracking.

use async_trait::async_trait;
use thiserror::Error;

use crate::context::CookieChange;
use crate::entities::users;
use crate::session::SessionError;

/// Errors specific to authentication operations.
///
/// Every variant except [`AuthError::Database`] and [`AuthError::Session`]
/// is an expected outcome whose `Display` text is the user-facing message.
/// The two infrastructure variants are the only class that should surface
/// as hard errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Field label depends on the configured login type.
    #[error("The {0} and Password fields are required")]
    MissingCredentials(String),

    /// Deliberately identical for unknown logins and wrong passwords.
    #[error("Incorrect email/username or password")]
    InvalidCredentials,

    #[error("Your account has not been activated yet. Please check your email for activation instructions")]
    NotActivated,

    #[error("Your account is awaiting approval from a site administrator")]
    ApprovalPending,

    #[error("This account has been deactivated. Please contact the site administrator to restore it")]
    AccountDeleted,

    #[error("{0}")]
    Banned(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl AuthError {
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Session(_) | Self::Database(_))
    }
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        Self::Session(err.to_string())
    }
}

/// Resolved account for the current session, without credential material.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role_id: i32,
    pub active: i32,
    pub last_login: Option<String>,
    pub login_destination: Option<String>,
}

impl From<users::Model> for AuthenticatedUser {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            role_id: model.role_id,
            active: model.active,
            last_login: model.last_login,
            login_destination: model.login_destination,
        }
    }
}

/// Domain service trait for authentication.
///
/// Implementations are request-scoped: `user` and `is_logged_in` memoize
/// their first resolution for the lifetime of the instance.
#[async_trait]
pub trait AuthenticationBackend: Send + Sync {
    /// Attempt to log the user in.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] (and friends) for the
    /// expected failure outcomes; only the infrastructure variants
    /// indicate something actually broke.
    async fn login(&self, login: &str, password: &str, remember: bool) -> Result<(), AuthError>;

    /// Destroys the autologin information and the current session.
    /// Safe to call with no session or cookie present.
    async fn logout(&self) -> Result<(), AuthError>;

    /// Resolves the session to a full account record, verifying the
    /// session token still matches the stored password hash.
    async fn user(&self) -> Result<Option<AuthenticatedUser>, AuthError>;

    /// Same validation as [`AuthenticationBackend::user`] against a
    /// narrow projection.
    async fn is_logged_in(&self) -> Result<bool, AuthError>;

    /// The session's user id, 0 when absent.
    async fn user_id(&self) -> Result<i32, AuthError>;

    /// The login string recorded in the session.
    async fn identity(&self) -> Result<Option<String>, AuthError>;

    /// Attempts from the caller's address, or for the given login from
    /// anywhere.
    async fn num_login_attempts(&self, login: Option<&str>) -> Result<u64, AuthError>;

    /// Post-login redirect captured by the last successful `login`;
    /// empty unless the account sets one and redirects are enabled.
    fn login_destination(&self) -> String;

    /// The autologin cookie update this instance wants applied to the
    /// response, if any. Consumed on read.
    fn take_cookie_change(&self) -> Option<CookieChange>;
}
