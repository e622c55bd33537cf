//! Domain service for authorization decisions.
//!
//! Pure read side: the only mutation is cache population. Denials are
//! decisions, not errors.

use async_trait::async_trait;

use crate::services::authentication::AuthError;

/// Outcome of an access restriction check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Granted,
    /// The caller must be sent elsewhere; `notice` is the flash message
    /// to show when they land.
    Denied { redirect_to: String, notice: String },
}

impl Access {
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Domain service trait for authorization.
///
/// Implementations are request-scoped; permission and role caches live
/// for the instance's lifetime only.
#[async_trait]
pub trait AuthorizationBackend: Send + Sync {
    /// Whether `role_id` (defaulting to the session's role) holds the
    /// named permission. `override_missing` is returned verbatim when the
    /// permission does not exist in the catalogue at all; it does NOT
    /// apply when the role merely lacks a known permission.
    async fn has_permission(
        &self,
        permission: &str,
        role_id: Option<i32>,
        override_missing: bool,
    ) -> Result<bool, AuthError>;

    /// Case-insensitive existence check against the catalogue.
    async fn permission_exists(&self, permission: &str) -> Result<bool, AuthError>;

    /// Grants unless `permission` is given and the session's role lacks
    /// it. Never checks login state; that is layered on by the facade.
    async fn restrict(
        &self,
        permission: Option<&str>,
        uri: Option<&str>,
    ) -> Result<Access, AuthError>;

    /// The session's role id, 0 when absent.
    async fn role_id(&self) -> Result<i32, AuthError>;

    /// The matching role name, or `""` for an unknown id.
    async fn role_name_by_id(&self, role_id: i32) -> Result<String, AuthError>;
}
