use axum::{
    Json,
    extract::{Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState};
use crate::context::{CookieChange, RequestContext};
use crate::services::{Access, Auth};
use crate::session::HttpSession;

pub const AUTOLOGIN_COOKIE: &str = "autologin";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user_id: i32,
    pub role_id: i32,
    pub identity: String,
    /// Post-login redirect; empty unless the account overrides it
    pub destination: String,
}

#[derive(Serialize)]
pub struct UserInfoResponse {
    pub user_id: i32,
    pub username: String,
    pub email: String,
    pub identity: String,
    pub role_id: i32,
    pub role_name: String,
    pub last_login: Option<String>,
}

#[derive(Deserialize)]
pub struct AttemptsQuery {
    pub login: Option<String>,
}

#[derive(Serialize)]
pub struct AttemptsResponse {
    pub attempts: u64,
}

// ============================================================================
// Middleware
// ============================================================================

/// Gate for routers whose every route needs the same permission. Builds
/// the per-request engines (running the autologin resume), applies the
/// facade's restriction, and turns a denial into a redirect carrying a
/// flash notice.
pub async fn require_permission(
    State((state, permission)): State<(Arc<AppState>, &'static str)>,
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers().clone();
    let current_url = request.uri().path().to_string();

    let (auth, ctx) = connect_auth(&state, session, &headers, &current_url).await?;

    if let Some(identity) = auth.identity().await? {
        tracing::Span::current().record("user_id", &identity);
    }

    let access = auth.restrict(Some(permission), None).await?;

    let mut response = match access {
        Access::Granted => next.run(request).await,
        Access::Denied {
            redirect_to,
            notice,
        } => {
            ctx.session
                .set_notice(&notice)
                .await
                .map_err(|e| ApiError::internal(e.to_string()))?;

            Redirect::to(&redirect_to).into_response()
        }
    };

    apply_cookie_change(&state, &auth, &mut response).await;

    Ok(response)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
/// Authenticate with a login identifier and password.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let (auth, _) = connect_auth(&state, session, &headers, "/api/auth/login").await?;

    auth.login(&payload.login, &payload.password, payload.remember)
        .await?;

    let user_id = auth.user_id().await?;
    let role_id = auth.role_id().await?;
    let identity = auth.identity().await?.unwrap_or_default();

    tracing::info!(user_id, "User logged in");

    let mut response = Json(ApiResponse::success(LoginResponse {
        user_id,
        role_id,
        identity,
        destination: auth.login_destination(),
    }))
    .into_response();

    apply_cookie_change(&state, &auth, &mut response).await;

    Ok(response)
}

/// POST /auth/logout
/// Invalidate the current session and autologin token. Idempotent.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (auth, _) = connect_auth(&state, session, &headers, "/api/auth/logout").await?;

    auth.logout().await?;

    let mut response = (StatusCode::OK, "Logged out").into_response();
    apply_cookie_change(&state, &auth, &mut response).await;

    Ok(response)
}

/// GET /auth/me
/// Current identity, resolved through the session or an autologin cookie.
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (auth, _) = connect_auth(&state, session, &headers, "/api/auth/me").await?;

    let user = auth
        .user()
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?;

    let role_name = auth.role_name_by_id(user.role_id).await?;
    let identity = auth.identity().await?.unwrap_or_default();

    let mut response = Json(ApiResponse::success(UserInfoResponse {
        user_id: user.id,
        username: user.username,
        email: user.email,
        identity,
        role_id: user.role_id,
        role_name,
        last_login: user.last_login,
    }))
    .into_response();

    apply_cookie_change(&state, &auth, &mut response).await;

    Ok(response)
}

/// GET /auth/attempts
/// Failed-attempt count for the caller's address and optional login.
pub async fn get_login_attempts(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    Query(query): Query<AttemptsQuery>,
) -> Result<Response, ApiError> {
    let (auth, _) = connect_auth(&state, session, &headers, "/api/auth/attempts").await?;

    let attempts = auth.num_login_attempts(query.login.as_deref()).await?;

    let mut response = Json(ApiResponse::success(AttemptsResponse { attempts })).into_response();
    apply_cookie_change(&state, &auth, &mut response).await;

    Ok(response)
}

// ============================================================================
// Helpers
// ============================================================================

/// Build the per-request engines. Returns the context alongside so
/// callers can reach the session handle it carries.
pub(crate) async fn connect_auth(
    state: &Arc<AppState>,
    session: Session,
    headers: &HeaderMap,
    current_url: &str,
) -> Result<(Auth, RequestContext), ApiError> {
    let auth_config = state.config().read().await.auth.clone();

    let ctx = RequestContext::new(Arc::new(HttpSession::new(session)), client_ip(headers))
        .with_autologin_cookie(autologin_cookie(headers))
        .with_current_url(current_url);

    let auth = Auth::connect(
        state.store().clone(),
        auth_config,
        state.event_bus().clone(),
        ctx.clone(),
    )
    .await?;

    Ok((auth, ctx))
}

/// Append the engine's pending autologin cookie update to the response.
pub(crate) async fn apply_cookie_change(state: &Arc<AppState>, auth: &Auth, response: &mut Response) {
    let Some(change) = auth.take_cookie_change() else {
        return;
    };

    let secure = state.config().read().await.server.secure_cookies;
    let suffix = if secure { "; Secure" } else { "" };

    let cookie = match change {
        CookieChange::Set {
            value,
            max_age_seconds,
        } => format!(
            "{AUTOLOGIN_COOKIE}={value}; Max-Age={max_age_seconds}; Path=/; HttpOnly; SameSite=Lax{suffix}"
        ),
        CookieChange::Clear => format!(
            "{AUTOLOGIN_COOKIE}=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax{suffix}"
        ),
    };

    if let Ok(header) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(SET_COOKIE, header);
    }
}

/// Caller address for attempt tracking: forwarded headers first, else a
/// loopback placeholder (direct peer addresses are not observable behind
/// `oneshot`-style serving).
fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
        && !first.trim().is_empty()
    {
        return first.trim().to_string();
    }

    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return value.trim().to_string();
    }

    "127.0.0.1".to_string()
}

/// Pull the autologin cookie value out of the Cookie header, if present.
fn autologin_cookie(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(axum::http::header::COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };

        for pair in value.split(';') {
            if let Some((name, cookie_value)) = pair.trim().split_once('=')
                && name.trim() == AUTOLOGIN_COOKIE
                && !cookie_value.is_empty()
            {
                return Some(cookie_value.to_string());
            }
        }
    }

    None
}
