//! Per-request context handed to the engines.
//!
//! Everything request- or environment-scoped the engines need (session
//! access, caller address, the autologin cookie value, clock, token
//! source) arrives through one explicit object, so tests can pin time
//! and token material.

use std::sync::Arc;

use crate::security::{Clock, OsTokens, SystemClock, TokenSource};
use crate::session::SessionState;

/// Pending change to the autologin cookie. The engine records it; the
/// transport layer applies it to the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieChange {
    Set { value: String, max_age_seconds: u64 },
    Clear,
}

#[derive(Clone)]
pub struct RequestContext {
    pub session: Arc<dyn SessionState>,
    pub ip_address: String,
    pub autologin_cookie: Option<String>,
    pub current_url: String,
    pub clock: Arc<dyn Clock>,
    pub tokens: Arc<dyn TokenSource>,
}

impl RequestContext {
    pub fn new(session: Arc<dyn SessionState>, ip_address: impl Into<String>) -> Self {
        Self {
            session,
            ip_address: ip_address.into(),
            autologin_cookie: None,
            current_url: "/".to_string(),
            clock: Arc::new(SystemClock),
            tokens: Arc::new(OsTokens),
        }
    }

    #[must_use]
    pub fn with_autologin_cookie(mut self, cookie: Option<String>) -> Self {
        self.autologin_cookie = cookie;
        self
    }

    #[must_use]
    pub fn with_current_url(mut self, url: impl Into<String>) -> Self {
        self.current_url = url.into();
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_tokens(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }
}
