//! Composition facade over the authentication and authorization backends.
//!
//! `Auth` adds no logic of its own beyond the login gate in
//! [`Auth::restrict`]; everything else is delegation.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::AuthConfig;
use crate::context::{CookieChange, RequestContext};
use crate::db::Store;
use crate::domain::events::AuthEvent;
use crate::services::authentication::{AuthError, AuthenticatedUser, AuthenticationBackend};
use crate::services::authentication_impl::SeaOrmAuthentication;
use crate::services::authorization::{Access, AuthorizationBackend};
use crate::services::authorization_impl::SeaOrmAuthorization;

pub const MUST_LOGIN_NOTICE: &str = "You must be logged in to view that page";
pub const LOGIN_URL: &str = "/login";

pub struct Auth {
    authentication: Arc<dyn AuthenticationBackend>,
    authorization: Arc<dyn AuthorizationBackend>,
}

impl Auth {
    /// Builds the `SeaORM`-backed engines for one request. The backends
    /// are chosen here, once; the autologin resume runs as part of
    /// construction.
    pub async fn connect(
        store: Store,
        config: AuthConfig,
        events: broadcast::Sender<AuthEvent>,
        ctx: RequestContext,
    ) -> Result<Self, AuthError> {
        let authentication =
            SeaOrmAuthentication::connect(store.clone(), config, events, ctx.clone()).await?;
        let authorization = SeaOrmAuthorization::new(store, ctx);

        Ok(Self {
            authentication: Arc::new(authentication),
            authorization: Arc::new(authorization),
        })
    }

    /// Composes pre-built backends, for callers wiring their own.
    #[must_use]
    pub fn with_backends(
        authentication: Arc<dyn AuthenticationBackend>,
        authorization: Arc<dyn AuthorizationBackend>,
    ) -> Self {
        Self {
            authentication,
            authorization,
        }
    }

    pub async fn login(
        &self,
        login: &str,
        password: &str,
        remember: bool,
    ) -> Result<(), AuthError> {
        self.authentication.login(login, password, remember).await
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        self.authentication.logout().await
    }

    pub async fn user(&self) -> Result<Option<AuthenticatedUser>, AuthError> {
        self.authentication.user().await
    }

    pub async fn is_logged_in(&self) -> Result<bool, AuthError> {
        self.authentication.is_logged_in().await
    }

    pub async fn user_id(&self) -> Result<i32, AuthError> {
        self.authentication.user_id().await
    }

    pub async fn identity(&self) -> Result<Option<String>, AuthError> {
        self.authentication.identity().await
    }

    pub async fn num_login_attempts(&self, login: Option<&str>) -> Result<u64, AuthError> {
        self.authentication.num_login_attempts(login).await
    }

    #[must_use]
    pub fn login_destination(&self) -> String {
        self.authentication.login_destination()
    }

    #[must_use]
    pub fn take_cookie_change(&self) -> Option<CookieChange> {
        self.authentication.take_cookie_change()
    }

    pub async fn has_permission(
        &self,
        permission: &str,
        role_id: Option<i32>,
        override_missing: bool,
    ) -> Result<bool, AuthError> {
        self.authorization
            .has_permission(permission, role_id, override_missing)
            .await
    }

    pub async fn permission_exists(&self, permission: &str) -> Result<bool, AuthError> {
        self.authorization.permission_exists(permission).await
    }

    pub async fn role_id(&self) -> Result<i32, AuthError> {
        self.authorization.role_id().await
    }

    pub async fn role_name_by_id(&self, role_id: i32) -> Result<String, AuthError> {
        self.authorization.role_name_by_id(role_id).await
    }

    /// Restricts to logged-in visitors holding `permission`. Without a
    /// valid session the visitor is logged out (clearing any stale
    /// autologin state) and sent to the login page; otherwise the
    /// permission check decides.
    pub async fn restrict(
        &self,
        permission: Option<&str>,
        uri: Option<&str>,
    ) -> Result<Access, AuthError> {
        if !self.authentication.is_logged_in().await? {
            self.authentication.logout().await?;

            return Ok(Access::Denied {
                redirect_to: LOGIN_URL.to_string(),
                notice: MUST_LOGIN_NOTICE.to_string(),
            });
        }

        self.authorization.restrict(permission, uri).await
    }
}
