//! Session-store access for the engines.
//!
//! The engines never talk to the HTTP layer directly; they read and write
//! the session through the [`SessionState`] capability. The HTTP layer
//! hands them a `tower-sessions`-backed implementation, tests an
//! in-memory one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tower_sessions::Session;

pub const KEY_USER_ID: &str = "user_id";
pub const KEY_AUTH_CUSTOM: &str = "auth_custom";
pub const KEY_USER_TOKEN: &str = "user_token";
pub const KEY_IDENTITY: &str = "identity";
pub const KEY_ROLE_ID: &str = "role_id";
pub const KEY_LOGGED_IN: &str = "logged_in";
pub const KEY_PREVIOUS_PAGE: &str = "previous_page";
pub const KEY_FLASH_NOTICE: &str = "flash_notice";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store error: {0}")]
    Store(String),
}

/// The fields written for an authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub user_id: i32,
    pub auth_custom: String,
    /// Binds the session to the password hash it was established with
    pub user_token: String,
    pub identity: String,
    pub role_id: i32,
}

#[async_trait]
pub trait SessionState: Send + Sync {
    async fn user_id(&self) -> Result<Option<i32>, SessionError>;
    async fn identity(&self) -> Result<Option<String>, SessionError>;
    async fn auth_custom(&self) -> Result<Option<String>, SessionError>;
    async fn user_token(&self) -> Result<Option<String>, SessionError>;
    async fn role_id(&self) -> Result<Option<i32>, SessionError>;
    async fn previous_page(&self) -> Result<Option<String>, SessionError>;

    async fn store_identity(&self, identity: &SessionIdentity) -> Result<(), SessionError>;
    async fn set_notice(&self, notice: &str) -> Result<(), SessionError>;
    async fn destroy(&self) -> Result<(), SessionError>;
}

/// `tower-sessions`-backed state used by the HTTP layer.
pub struct HttpSession {
    inner: Session,
}

impl HttpSession {
    #[must_use]
    pub const fn new(inner: Session) -> Self {
        Self { inner }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionError> {
        self.inner
            .get::<T>(key)
            .await
            .map_err(|e| SessionError::Store(e.to_string()))
    }

    async fn insert<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: T,
    ) -> Result<(), SessionError> {
        self.inner
            .insert(key, value)
            .await
            .map_err(|e| SessionError::Store(e.to_string()))
    }
}

#[async_trait]
impl SessionState for HttpSession {
    async fn user_id(&self) -> Result<Option<i32>, SessionError> {
        self.get(KEY_USER_ID).await
    }

    async fn identity(&self) -> Result<Option<String>, SessionError> {
        self.get(KEY_IDENTITY).await
    }

    async fn auth_custom(&self) -> Result<Option<String>, SessionError> {
        self.get(KEY_AUTH_CUSTOM).await
    }

    async fn user_token(&self) -> Result<Option<String>, SessionError> {
        self.get(KEY_USER_TOKEN).await
    }

    async fn role_id(&self) -> Result<Option<i32>, SessionError> {
        self.get(KEY_ROLE_ID).await
    }

    async fn previous_page(&self) -> Result<Option<String>, SessionError> {
        self.get(KEY_PREVIOUS_PAGE).await
    }

    async fn store_identity(&self, identity: &SessionIdentity) -> Result<(), SessionError> {
        self.insert(KEY_USER_ID, identity.user_id).await?;
        self.insert(KEY_AUTH_CUSTOM, &identity.auth_custom).await?;
        self.insert(KEY_USER_TOKEN, &identity.user_token).await?;
        self.insert(KEY_IDENTITY, &identity.identity).await?;
        self.insert(KEY_ROLE_ID, identity.role_id).await?;
        self.insert(KEY_LOGGED_IN, true).await?;
        Ok(())
    }

    async fn set_notice(&self, notice: &str) -> Result<(), SessionError> {
        self.insert(KEY_FLASH_NOTICE, notice).await
    }

    async fn destroy(&self) -> Result<(), SessionError> {
        self.inner
            .flush()
            .await
            .map_err(|e| SessionError::Store(e.to_string()))
    }
}

/// In-memory state for tests and non-HTTP callers.
#[derive(Default)]
pub struct MemorySession {
    values: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemorySession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an arbitrary key, e.g. `previous_page` written by a routing
    /// layer this store stands in for.
    pub fn set(&self, key: &str, value: serde_json::Value) {
        self.lock().insert(key.to_string(), value);
    }

    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<serde_json::Value> {
        self.lock().get(key).cloned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, serde_json::Value>> {
        self.values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn get_string(&self, key: &str) -> Option<String> {
        self.lock()
            .get(key)
            .and_then(|v| v.as_str().map(ToString::to_string))
    }

    fn get_i32(&self, key: &str) -> Option<i32> {
        self.lock()
            .get(key)
            .and_then(serde_json::Value::as_i64)
            .and_then(|v| i32::try_from(v).ok())
    }
}

#[async_trait]
impl SessionState for MemorySession {
    async fn user_id(&self) -> Result<Option<i32>, SessionError> {
        Ok(self.get_i32(KEY_USER_ID))
    }

    async fn identity(&self) -> Result<Option<String>, SessionError> {
        Ok(self.get_string(KEY_IDENTITY))
    }

    async fn auth_custom(&self) -> Result<Option<String>, SessionError> {
        Ok(self.get_string(KEY_AUTH_CUSTOM))
    }

    async fn user_token(&self) -> Result<Option<String>, SessionError> {
        Ok(self.get_string(KEY_USER_TOKEN))
    }

    async fn role_id(&self) -> Result<Option<i32>, SessionError> {
        Ok(self.get_i32(KEY_ROLE_ID))
    }

    async fn previous_page(&self) -> Result<Option<String>, SessionError> {
        Ok(self.get_string(KEY_PREVIOUS_PAGE))
    }

    async fn store_identity(&self, identity: &SessionIdentity) -> Result<(), SessionError> {
        let mut values = self.lock();
        values.insert(KEY_USER_ID.to_string(), identity.user_id.into());
        values.insert(
            KEY_AUTH_CUSTOM.to_string(),
            identity.auth_custom.clone().into(),
        );
        values.insert(
            KEY_USER_TOKEN.to_string(),
            identity.user_token.clone().into(),
        );
        values.insert(KEY_IDENTITY.to_string(), identity.identity.clone().into());
        values.insert(KEY_ROLE_ID.to_string(), identity.role_id.into());
        values.insert(KEY_LOGGED_IN.to_string(), true.into());
        Ok(())
    }

    async fn set_notice(&self, notice: &str) -> Result<(), SessionError> {
        self.lock()
            .insert(KEY_FLASH_NOTICE.to_string(), notice.into());
        Ok(())
    }

    async fn destroy(&self) -> Result<(), SessionError> {
        self.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> SessionIdentity {
        SessionIdentity {
            user_id: 42,
            auth_custom: "ripley".to_string(),
            user_token: "token".to_string(),
            identity: "ripley@weyland.example".to_string(),
            role_id: 2,
        }
    }

    #[tokio::test]
    async fn memory_session_round_trips_identity() {
        let session = MemorySession::new();
        session.store_identity(&identity()).await.unwrap();

        assert_eq!(session.user_id().await.unwrap(), Some(42));
        assert_eq!(
            session.identity().await.unwrap().as_deref(),
            Some("ripley@weyland.example")
        );
        assert_eq!(session.role_id().await.unwrap(), Some(2));
        assert_eq!(session.get_raw(KEY_LOGGED_IN), Some(true.into()));
    }

    #[tokio::test]
    async fn destroy_clears_everything() {
        let session = MemorySession::new();
        session.store_identity(&identity()).await.unwrap();
        session.destroy().await.unwrap();

        assert!(session.is_empty());
        assert_eq!(session.user_id().await.unwrap(), None);
    }
}
