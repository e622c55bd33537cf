//! `SeaORM` implementation of the `AuthenticationBackend` trait.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::config::{AuthConfig, LoginType};
use crate::context::{CookieChange, RequestContext};
use crate::db::Store;
use crate::domain::events::AuthEvent;
use crate::security;
use crate::services::authentication::{AuthError, AuthenticatedUser, AuthenticationBackend};
use crate::session::SessionIdentity;

const DEFAULT_BAN_MESSAGE: &str = "This account has been banned";

pub struct SeaOrmAuthentication {
    store: Store,
    config: AuthConfig,
    ctx: RequestContext,
    events: broadcast::Sender<AuthEvent>,
    login_destination: Mutex<String>,
    cookie_change: Mutex<Option<CookieChange>>,
    // Memoized per instance; resolved at most once per request.
    user: RwLock<Option<Option<AuthenticatedUser>>>,
    logged_in: RwLock<Option<bool>>,
}

impl SeaOrmAuthentication {
    /// Builds the engine and immediately attempts an autologin resume
    /// from the request's cookie, so the session fallback is in place
    /// before the first `is_logged_in` query.
    pub async fn connect(
        store: Store,
        config: AuthConfig,
        events: broadcast::Sender<AuthEvent>,
        ctx: RequestContext,
    ) -> Result<Self, AuthError> {
        let engine = Self {
            store,
            config,
            ctx,
            events,
            login_destination: Mutex::new(String::new()),
            cookie_change: Mutex::new(None),
            user: RwLock::new(None),
            logged_in: RwLock::new(None),
        };

        engine.autologin().await?;

        Ok(engine)
    }

    /// Attempts to log the user in based on an existing autologin cookie.
    async fn autologin(&self) -> Result<(), AuthError> {
        if !self.config.allow_remember {
            return Ok(());
        }

        let Some(cookie) = self.ctx.autologin_cookie.as_deref() else {
            return Ok(());
        };

        let Some((user_id, token)) = parse_autologin_cookie(cookie) else {
            debug!("ignoring malformed autologin cookie");
            return Ok(());
        };

        // A token resumes a session exactly once; anything but a single
        // match is stale.
        if self.store.autologin_matches(user_id, token).await? != 1 {
            return Ok(());
        }

        *self.logged_in.write().await = Some(true);

        // Without a live session we refresh the token and start one.
        if self.ctx.session.user_id().await?.is_none() {
            let Some(user) = self.store.find_user_by_id(user_id).await? else {
                return Ok(());
            };

            self.setup_session(
                user.id,
                &user.username,
                &user.password_hash,
                &user.email,
                user.role_id,
                true,
                Some(token),
                &user.username,
            )
            .await?;
        }

        Ok(())
    }

    /// Creates the session information for the current user, and an
    /// autologin token when remembering.
    #[allow(clippy::too_many_arguments)]
    pub async fn setup_session(
        &self,
        user_id: i32,
        username: &str,
        password_hash: &str,
        email: &str,
        role_id: i32,
        remember: bool,
        old_token: Option<&str>,
        display_name: &str,
    ) -> Result<bool, AuthError> {
        let identity = derive_identity(&self.config, username, email);
        let auth_custom = derive_auth_custom(&self.config, username, email, display_name);

        let data = SessionIdentity {
            user_id,
            auth_custom: auth_custom.to_string(),
            user_token: security::session_token(user_id, password_hash),
            identity: identity.to_string(),
            role_id,
        };

        self.ctx.session.store_identity(&data).await?;

        if remember {
            return self.create_autologin(user_id, old_token).await;
        }

        Ok(true)
    }

    /// Issues a fresh token: a brand new row when `old_token` is absent,
    /// otherwise an in-place replacement of the presented token.
    async fn create_autologin(
        &self,
        user_id: i32,
        old_token: Option<&str>,
    ) -> Result<bool, AuthError> {
        if !self.config.allow_remember {
            return Ok(false);
        }

        let token = self.ctx.tokens.token();
        let created_on = security::format_timestamp(self.ctx.clock.now());

        let stored = match old_token.filter(|t| !t.is_empty()) {
            None => {
                self.store
                    .create_autologin(user_id, &token, &created_on)
                    .await?;
                true
            }
            Some(old) => {
                self.store
                    .rotate_autologin(user_id, old, &token, &created_on)
                    .await?
            }
        };

        if stored {
            *lock(&self.cookie_change) = Some(CookieChange::Set {
                value: format!("{user_id}~{token}"),
                max_age_seconds: self.config.remember_length,
            });
        }

        Ok(stored)
    }

    /// Removes the cookie-matched autologin row, then sweeps out every
    /// token past the purge age.
    async fn delete_autologin(&self) -> Result<(), AuthError> {
        if !self.config.allow_remember {
            return Ok(());
        }

        if let Some(cookie) = self.ctx.autologin_cookie.as_deref() {
            *lock(&self.cookie_change) = Some(CookieChange::Clear);

            if let Some((user_id, token)) = parse_autologin_cookie(cookie) {
                self.store.delete_autologin(user_id, token).await?;
            }
        }

        let cutoff = self.ctx.clock.now() - chrono::Duration::days(self.config.autologin_purge_days);
        self.store
            .purge_autologins_before(&security::format_timestamp(cutoff))
            .await?;

        Ok(())
    }

    /// Records a login attempt against the caller's address.
    pub async fn increase_login_attempts(&self, login: &str) -> Result<(), AuthError> {
        let now = security::format_timestamp(self.ctx.clock.now());
        self.store
            .record_login_attempt(&self.ctx.ip_address, login, &now)
            .await?;
        Ok(())
    }

    /// Clears attempts for this login from the caller's address, pruning
    /// attempts older than `expires` seconds from everyone while at it.
    pub async fn clear_login_attempts(&self, login: &str, expires: i64) -> Result<(), AuthError> {
        let cutoff = self.ctx.clock.now() - chrono::Duration::seconds(expires);
        self.store
            .clear_login_attempts(
                &self.ctx.ip_address,
                login,
                &security::format_timestamp(cutoff),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuthenticationBackend for SeaOrmAuthentication {
    async fn login(&self, login: &str, password: &str, remember: bool) -> Result<(), AuthError> {
        if login.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials(
                self.config.login_type.field_label().to_string(),
            ));
        }

        let Some(user) = self
            .store
            .find_user_for_login(login, self.config.login_type)
            .await?
        else {
            // Indistinguishable from a wrong password.
            return Err(AuthError::InvalidCredentials);
        };

        let activation = self.config.user_activation_method;
        if user.active == 0 && activation > 0 {
            return Err(if activation == 1 {
                AuthError::NotActivated
            } else {
                AuthError::ApprovalPending
            });
        }

        if user.deleted >= 1 {
            return Err(AuthError::AccountDeleted);
        }

        let presented = security::credential_hash(&user.salt, password);
        if !security::digests_match(&presented, &user.password_hash) {
            self.increase_login_attempts(login).await?;
            return Err(AuthError::InvalidCredentials);
        }

        // Banned accounts never reach session establishment, even with
        // correct credentials.
        if user.banned {
            self.increase_login_attempts(login).await?;
            let message = user
                .ban_message
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_BAN_MESSAGE.to_string());
            return Err(AuthError::Banned(message));
        }

        self.clear_login_attempts(login, self.config.attempt_retention_seconds)
            .await?;

        self.setup_session(
            user.id,
            &user.username,
            &user.password_hash,
            &user.email,
            user.role_id,
            remember,
            None,
            &user.username,
        )
        .await?;

        let now = security::format_timestamp(self.ctx.clock.now());
        self.store
            .record_user_login(user.id, &now, &self.ctx.ip_address)
            .await?;

        let _ = self.events.send(AuthEvent::AfterLogin {
            user_id: user.id,
            role_id: user.role_id,
        });

        if self.config.do_login_redirect {
            *lock(&self.login_destination) = user.login_destination.unwrap_or_default();
        }

        Ok(())
    }

    async fn logout(&self) -> Result<(), AuthError> {
        let user_id = self.user_id().await?;
        let role_id = self.ctx.session.role_id().await?.unwrap_or(0);

        let _ = self
            .events
            .send(AuthEvent::BeforeLogout { user_id, role_id });

        self.delete_autologin().await?;
        self.ctx.session.destroy().await?;

        Ok(())
    }

    async fn user(&self) -> Result<Option<AuthenticatedUser>, AuthError> {
        if let Some(cached) = self.user.read().await.clone() {
            return Ok(cached);
        }

        let mut resolved = None;

        if self.ctx.session.identity().await?.is_some()
            && let Some(user_id) = self.ctx.session.user_id().await?
            && let Some(user) = self.store.find_user_by_id(user_id).await?
        {
            // A session whose token no longer matches the stored password
            // hash was established against a password that has since
            // changed; it resolves to no one, without being destroyed.
            let expected = security::session_token(user_id, &user.password_hash);
            let stored = self.ctx.session.user_token().await?;
            if stored.is_some_and(|t| security::digests_match(&expected, &t)) {
                resolved = Some(AuthenticatedUser::from(user));
            }
        }

        *self.user.write().await = Some(resolved.clone());

        Ok(resolved)
    }

    async fn is_logged_in(&self) -> Result<bool, AuthError> {
        if let Some(cached) = *self.logged_in.read().await {
            return Ok(cached);
        }

        let mut valid = false;

        if self.ctx.session.identity().await?.is_some()
            && let Some(user_id) = self.ctx.session.user_id().await?
            && let Some(user) = self.store.user_auth_projection(user_id).await?
        {
            let expected = security::session_token(user_id, &user.password_hash);
            let stored = self.ctx.session.user_token().await?;
            valid = stored.is_some_and(|t| security::digests_match(&expected, &t));
        }

        *self.logged_in.write().await = Some(valid);

        Ok(valid)
    }

    async fn user_id(&self) -> Result<i32, AuthError> {
        Ok(self.ctx.session.user_id().await?.unwrap_or(0))
    }

    async fn identity(&self) -> Result<Option<String>, AuthError> {
        Ok(self.ctx.session.identity().await?)
    }

    async fn num_login_attempts(&self, login: Option<&str>) -> Result<u64, AuthError> {
        let count = self
            .store
            .count_login_attempts(&self.ctx.ip_address, login)
            .await?;
        Ok(count)
    }

    fn login_destination(&self) -> String {
        lock(&self.login_destination).clone()
    }

    fn take_cookie_change(&self) -> Option<CookieChange> {
        lock(&self.cookie_change).take()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Splits an autologin cookie of the form `<user_id>~<token>`.
fn parse_autologin_cookie(cookie: &str) -> Option<(i32, &str)> {
    let (user_id, token) = cookie.split_once('~')?;
    let user_id = user_id.parse().ok()?;

    if token.is_empty() {
        return None;
    }

    Some((user_id, token))
}

/// The canonical identity string for the session. With `both`, email wins
/// unless usernames are displayed globally.
fn derive_identity<'a>(config: &AuthConfig, username: &'a str, email: &'a str) -> &'a str {
    match config.login_type {
        LoginType::Both => {
            if config.use_usernames != 0 {
                username
            } else {
                email
            }
        }
        LoginType::Username => username,
        LoginType::Email => email,
    }
}

/// The display field stored next to the identity.
fn derive_auth_custom<'a>(
    config: &AuthConfig,
    username: &'a str,
    email: &'a str,
    display_name: &'a str,
) -> &'a str {
    if config.use_usernames == 0 && config.login_type == LoginType::Username {
        // Username identities with display names disabled keep an email
        // nearby for showing.
        email
    } else if config.use_usernames == 2 {
        display_name
    } else {
        username
    }
}
