//! Engine-level tests for the authentication state machine: credential
//! login, attempt throttling, session binding, and autologin rotation.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use tokio::sync::broadcast;

use wardkeep::config::{AuthConfig, LoginType};
use wardkeep::context::{CookieChange, RequestContext};
use wardkeep::db::Store;
use wardkeep::domain::events::AuthEvent;
use wardkeep::entities::{user_cookies, users};
use wardkeep::security::{self, Clock, TokenSource};
use wardkeep::services::{AuthError, AuthenticationBackend, SeaOrmAuthentication};
use wardkeep::session::{KEY_USER_ID, KEY_USER_TOKEN, MemorySession};

const TEST_IP: &str = "203.0.113.7";
const TEST_SALT: &str = "pepper";
const PASSWORD: &str = "correct-horse-battery";

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Hands out a scripted token sequence, falling back to random material
/// once exhausted.
struct SequenceTokens(Mutex<Vec<String>>);

impl SequenceTokens {
    fn new(tokens: &[&str]) -> Self {
        Self(Mutex::new(tokens.iter().map(ToString::to_string).collect()))
    }
}

impl TokenSource for SequenceTokens {
    fn token(&self) -> String {
        let mut tokens = self.0.lock().unwrap();
        if tokens.is_empty() {
            security::random_alnum(32)
        } else {
            tokens.remove(0)
        }
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

async fn mem_store() -> Store {
    // A single pooled connection keeps every query on the same in-memory
    // database.
    Store::with_pool_options("sqlite::memory:", 1, 1)
        .await
        .unwrap()
}

fn auth_config() -> AuthConfig {
    AuthConfig {
        login_type: LoginType::Both,
        use_usernames: 1,
        ..AuthConfig::default()
    }
}

fn test_ctx(session: Arc<MemorySession>) -> RequestContext {
    RequestContext::new(session, TEST_IP).with_clock(Arc::new(FixedClock(fixed_now())))
}

async fn engine_with(
    store: &Store,
    config: AuthConfig,
    ctx: RequestContext,
) -> (SeaOrmAuthentication, broadcast::Receiver<AuthEvent>) {
    let (events, receiver) = broadcast::channel(16);
    let engine = SeaOrmAuthentication::connect(store.clone(), config, events, ctx)
        .await
        .unwrap();
    (engine, receiver)
}

struct SeedUser {
    username: &'static str,
    email: &'static str,
    role_id: i32,
    password: &'static str,
    active: i32,
    deleted: i32,
    banned: bool,
    ban_message: Option<&'static str>,
    login_destination: Option<&'static str>,
}

impl Default for SeedUser {
    fn default() -> Self {
        Self {
            username: "ripley",
            email: "ripley@weyland.example",
            role_id: 2,
            password: PASSWORD,
            active: 1,
            deleted: 0,
            banned: false,
            ban_message: None,
            login_destination: None,
        }
    }
}

async fn insert_user(store: &Store, seed: SeedUser) -> i32 {
    let model = users::ActiveModel {
        username: Set(seed.username.to_string()),
        email: Set(seed.email.to_string()),
        role_id: Set(seed.role_id),
        salt: Set(TEST_SALT.to_string()),
        password_hash: Set(security::credential_hash(TEST_SALT, seed.password)),
        active: Set(seed.active),
        deleted: Set(seed.deleted),
        banned: Set(seed.banned),
        ban_message: Set(seed.ban_message.map(String::from)),
        login_destination: Set(seed.login_destination.map(String::from)),
        created_at: Set(security::format_timestamp(fixed_now())),
        ..Default::default()
    };

    model.insert(&store.conn).await.unwrap().id
}

async fn stored_token(store: &Store, user_id: i32) -> Option<String> {
    user_cookies::Entity::find()
        .filter(user_cookies::Column::UserId.eq(user_id))
        .one(&store.conn)
        .await
        .unwrap()
        .map(|row| row.token)
}

#[tokio::test]
async fn successful_login_establishes_session_and_clears_attempts() {
    let store = mem_store().await;
    let user_id = insert_user(&store, SeedUser::default()).await;

    let session = Arc::new(MemorySession::new());
    let (engine, mut events) = engine_with(&store, auth_config(), test_ctx(session.clone())).await;

    // A prior failure from this address.
    assert!(matches!(
        engine.login("ripley", "wrong", false).await,
        Err(AuthError::InvalidCredentials)
    ));
    assert_eq!(engine.num_login_attempts(Some("ripley")).await.unwrap(), 1);

    engine.login("ripley", PASSWORD, false).await.unwrap();

    // Session token is bound to the stored password hash.
    let password_hash = security::credential_hash(TEST_SALT, PASSWORD);
    assert_eq!(
        session.get_raw(KEY_USER_TOKEN),
        Some(security::session_token(user_id, &password_hash).into())
    );

    assert_eq!(engine.num_login_attempts(Some("ripley")).await.unwrap(), 0);
    assert!(engine.is_logged_in().await.unwrap());
    assert_eq!(engine.user_id().await.unwrap(), user_id);
    assert_eq!(engine.identity().await.unwrap().as_deref(), Some("ripley"));

    // Last-login metadata is stamped.
    let refreshed = store.find_user_by_id(user_id).await.unwrap().unwrap();
    assert_eq!(refreshed.last_ip.as_deref(), Some(TEST_IP));
    assert_eq!(
        refreshed.last_login,
        Some(security::format_timestamp(fixed_now()))
    );

    // The first failure produced no event; the success produced one.
    assert!(matches!(
        events.try_recv(),
        Ok(AuthEvent::AfterLogin { user_id: id, role_id: 2 }) if id == user_id
    ));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn wrong_password_counts_one_attempt_and_leaves_no_session() {
    let store = mem_store().await;
    insert_user(&store, SeedUser::default()).await;

    let session = Arc::new(MemorySession::new());
    let (engine, _) = engine_with(&store, auth_config(), test_ctx(session.clone())).await;

    assert!(matches!(
        engine.login("ripley", "nope", false).await,
        Err(AuthError::InvalidCredentials)
    ));

    assert_eq!(engine.num_login_attempts(None).await.unwrap(), 1);
    assert!(session.is_empty());
    assert!(!engine.is_logged_in().await.unwrap());
}

#[tokio::test]
async fn unknown_login_fails_generically_without_counting() {
    let store = mem_store().await;
    insert_user(&store, SeedUser::default()).await;

    let session = Arc::new(MemorySession::new());
    let (engine, _) = engine_with(&store, auth_config(), test_ctx(session)).await;

    assert!(matches!(
        engine.login("nobody@nowhere.example", PASSWORD, false).await,
        Err(AuthError::InvalidCredentials)
    ));
    assert_eq!(engine.num_login_attempts(None).await.unwrap(), 0);
}

#[tokio::test]
async fn empty_credentials_are_rejected_before_any_lookup() {
    let store = mem_store().await;

    let session = Arc::new(MemorySession::new());
    let (engine, _) = engine_with(&store, auth_config(), test_ctx(session)).await;

    let err = engine.login("", PASSWORD, false).await.unwrap_err();
    match err {
        AuthError::MissingCredentials(label) => assert_eq!(label, "Username/Email"),
        other => panic!("expected MissingCredentials, got {other:?}"),
    }

    assert!(matches!(
        engine.login("ripley", "", false).await,
        Err(AuthError::MissingCredentials(_))
    ));
    assert_eq!(engine.num_login_attempts(None).await.unwrap(), 0);
}

#[tokio::test]
async fn banned_user_with_correct_password_is_refused_and_counted() {
    let store = mem_store().await;
    insert_user(
        &store,
        SeedUser {
            banned: true,
            ban_message: Some("Out the airlock"),
            ..SeedUser::default()
        },
    )
    .await;

    let session = Arc::new(MemorySession::new());
    let (engine, mut events) = engine_with(&store, auth_config(), test_ctx(session.clone())).await;

    let err = engine.login("ripley", PASSWORD, false).await.unwrap_err();
    match err {
        AuthError::Banned(message) => assert_eq!(message, "Out the airlock"),
        other => panic!("expected Banned, got {other:?}"),
    }

    assert_eq!(engine.num_login_attempts(Some("ripley")).await.unwrap(), 1);
    assert!(session.is_empty());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn deleted_account_is_refused_without_counting() {
    let store = mem_store().await;
    insert_user(
        &store,
        SeedUser {
            deleted: 1,
            ..SeedUser::default()
        },
    )
    .await;

    let session = Arc::new(MemorySession::new());
    let (engine, _) = engine_with(&store, auth_config(), test_ctx(session)).await;

    assert!(matches!(
        engine.login("ripley", PASSWORD, false).await,
        Err(AuthError::AccountDeleted)
    ));
    assert_eq!(engine.num_login_attempts(None).await.unwrap(), 0);
}

#[tokio::test]
async fn activation_policy_gates_pending_accounts() {
    let store = mem_store().await;
    insert_user(
        &store,
        SeedUser {
            active: 0,
            ..SeedUser::default()
        },
    )
    .await;

    // Email-link activation pending.
    let mut config = auth_config();
    config.user_activation_method = 1;
    let (engine, _) = engine_with(&store, config, test_ctx(Arc::new(MemorySession::new()))).await;
    assert!(matches!(
        engine.login("ripley", PASSWORD, false).await,
        Err(AuthError::NotActivated)
    ));
    assert_eq!(engine.num_login_attempts(None).await.unwrap(), 0);

    // Admin approval pending.
    let mut config = auth_config();
    config.user_activation_method = 2;
    let (engine, _) = engine_with(&store, config, test_ctx(Arc::new(MemorySession::new()))).await;
    assert!(matches!(
        engine.login("ripley", PASSWORD, false).await,
        Err(AuthError::ApprovalPending)
    ));

    // No activation requirement: the pending flag is ignored.
    let mut config = auth_config();
    config.user_activation_method = 0;
    let (engine, _) = engine_with(&store, config, test_ctx(Arc::new(MemorySession::new()))).await;
    engine.login("ripley", PASSWORD, false).await.unwrap();
}

#[tokio::test]
async fn remember_login_issues_token_and_cookie() {
    let store = mem_store().await;
    let user_id = insert_user(&store, SeedUser::default()).await;

    let session = Arc::new(MemorySession::new());
    let ctx = test_ctx(session).with_tokens(Arc::new(SequenceTokens::new(&["token-alpha"])));
    let (engine, _) = engine_with(&store, auth_config(), ctx).await;

    engine.login("ripley", PASSWORD, true).await.unwrap();

    assert_eq!(
        stored_token(&store, user_id).await.as_deref(),
        Some("token-alpha")
    );
    assert_eq!(
        engine.take_cookie_change(),
        Some(CookieChange::Set {
            value: format!("{user_id}~token-alpha"),
            max_age_seconds: auth_config().remember_length,
        })
    );
    // Consumed on read.
    assert_eq!(engine.take_cookie_change(), None);
}

#[tokio::test]
async fn remember_is_inert_when_disabled_by_configuration() {
    let store = mem_store().await;
    let user_id = insert_user(&store, SeedUser::default()).await;

    let mut config = auth_config();
    config.allow_remember = false;

    let session = Arc::new(MemorySession::new());
    let (engine, _) = engine_with(&store, config, test_ctx(session)).await;

    engine.login("ripley", PASSWORD, true).await.unwrap();

    assert_eq!(stored_token(&store, user_id).await, None);
    assert_eq!(engine.take_cookie_change(), None);
}

#[tokio::test]
async fn autologin_resumes_exactly_once_and_rotates_the_token() {
    let store = mem_store().await;
    let user_id = insert_user(&store, SeedUser::default()).await;

    // Issue the initial token through a remembered login.
    let first_session = Arc::new(MemorySession::new());
    let ctx = test_ctx(first_session).with_tokens(Arc::new(SequenceTokens::new(&["token-one"])));
    let (engine, _) = engine_with(&store, auth_config(), ctx).await;
    engine.login("ripley", PASSWORD, true).await.unwrap();

    // A fresh browser session presenting the cookie resumes silently.
    let resumed_session = Arc::new(MemorySession::new());
    let ctx = test_ctx(resumed_session.clone())
        .with_autologin_cookie(Some(format!("{user_id}~token-one")))
        .with_tokens(Arc::new(SequenceTokens::new(&["token-two"])));
    let (resumed, _) = engine_with(&store, auth_config(), ctx).await;

    assert!(resumed.is_logged_in().await.unwrap());
    assert_eq!(resumed.user_id().await.unwrap(), user_id);
    assert_eq!(
        resumed_session.get_raw(KEY_USER_ID),
        Some(user_id.into())
    );

    // The presented token was rotated as part of resuming.
    assert_eq!(
        stored_token(&store, user_id).await.as_deref(),
        Some("token-two")
    );
    assert_eq!(
        resumed.take_cookie_change(),
        Some(CookieChange::Set {
            value: format!("{user_id}~token-two"),
            max_age_seconds: auth_config().remember_length,
        })
    );

    // Replaying the consumed cookie resumes nothing.
    let replay_session = Arc::new(MemorySession::new());
    let ctx = test_ctx(replay_session.clone())
        .with_autologin_cookie(Some(format!("{user_id}~token-one")));
    let (replayed, _) = engine_with(&store, auth_config(), ctx).await;

    assert!(!replayed.is_logged_in().await.unwrap());
    assert!(replay_session.is_empty());
    assert_eq!(replayed.take_cookie_change(), None);
}

#[tokio::test]
async fn autologin_ignores_malformed_and_foreign_cookies() {
    let store = mem_store().await;
    let user_id = insert_user(&store, SeedUser::default()).await;

    for cookie in [
        "garbage".to_string(),
        format!("{user_id}~"),
        format!("{user_id}~never-issued"),
        "999~token-one".to_string(),
    ] {
        let session = Arc::new(MemorySession::new());
        let ctx = test_ctx(session.clone()).with_autologin_cookie(Some(cookie));
        let (engine, _) = engine_with(&store, auth_config(), ctx).await;

        assert!(!engine.is_logged_in().await.unwrap());
        assert!(session.is_empty());
    }
}

#[tokio::test]
async fn password_change_silently_invalidates_the_session() {
    let store = mem_store().await;
    let user_id = insert_user(&store, SeedUser::default()).await;

    let session = Arc::new(MemorySession::new());
    let (engine, _) = engine_with(&store, auth_config(), test_ctx(session.clone())).await;
    engine.login("ripley", PASSWORD, false).await.unwrap();

    // The password changes elsewhere.
    let user = store.find_user_by_id(user_id).await.unwrap().unwrap();
    let mut active: users::ActiveModel = user.into();
    active.password_hash = Set(security::credential_hash(TEST_SALT, "a-new-password"));
    active.update(&store.conn).await.unwrap();

    // A fresh engine over the same session data resolves to no one, and
    // the session itself is left untouched.
    let (stale, _) = engine_with(&store, auth_config(), test_ctx(session.clone())).await;
    assert!(!stale.is_logged_in().await.unwrap());
    assert!(stale.user().await.unwrap().is_none());
    assert_eq!(session.get_raw(KEY_USER_ID), Some(user_id.into()));
}

#[tokio::test]
async fn logout_deletes_token_destroys_session_and_purges_old_rows() {
    let store = mem_store().await;
    let user_id = insert_user(&store, SeedUser::default()).await;

    let session = Arc::new(MemorySession::new());
    let ctx = test_ctx(session.clone()).with_tokens(Arc::new(SequenceTokens::new(&["token-one"])));
    let (engine, _) = engine_with(&store, auth_config(), ctx).await;
    engine.login("ripley", PASSWORD, true).await.unwrap();
    let _ = engine.take_cookie_change();

    // An ancient token row for someone else, eligible for the sweep.
    let ancient = user_cookies::ActiveModel {
        user_id: Set(999),
        token: Set("fossil".to_string()),
        created_on: Set(security::format_timestamp(
            fixed_now() - chrono::Duration::days(90),
        )),
        ..Default::default()
    };
    ancient.insert(&store.conn).await.unwrap();

    // Log out from a context carrying the autologin cookie.
    let ctx = test_ctx(session.clone())
        .with_autologin_cookie(Some(format!("{user_id}~token-one")));
    let (engine, mut events) = engine_with(&store, auth_config(), ctx).await;
    engine.logout().await.unwrap();

    assert!(matches!(
        events.try_recv(),
        Ok(AuthEvent::BeforeLogout { user_id: id, role_id: 2 }) if id == user_id
    ));
    assert!(session.is_empty());
    assert_eq!(stored_token(&store, user_id).await, None);
    assert_eq!(stored_token(&store, 999).await, None);
    assert_eq!(engine.take_cookie_change(), Some(CookieChange::Clear));
}

#[tokio::test]
async fn logout_is_idempotent_without_session_or_cookie() {
    let store = mem_store().await;

    let session = Arc::new(MemorySession::new());
    let (engine, _) = engine_with(&store, auth_config(), test_ctx(session.clone())).await;

    engine.logout().await.unwrap();
    engine.logout().await.unwrap();

    assert!(session.is_empty());
    assert_eq!(engine.take_cookie_change(), None);
}

#[tokio::test]
async fn clearing_attempts_also_prunes_stale_rows_from_anyone() {
    let store = mem_store().await;

    let now = security::format_timestamp(fixed_now());
    let stale = security::format_timestamp(fixed_now() - chrono::Duration::seconds(7200));

    store
        .record_login_attempt(TEST_IP, "a@x.com", &now)
        .await
        .unwrap();
    store
        .record_login_attempt("198.51.100.9", "b@x.com", &stale)
        .await
        .unwrap();
    store
        .record_login_attempt("198.51.100.9", "c@x.com", &now)
        .await
        .unwrap();

    let (engine, _) = engine_with(
        &store,
        auth_config(),
        test_ctx(Arc::new(MemorySession::new())),
    )
    .await;

    engine.clear_login_attempts("a@x.com", 3600).await.unwrap();

    // The (ip, login) pair is gone, the stale foreign row is gone, the
    // fresh foreign row survives.
    assert_eq!(
        store
            .count_login_attempts("198.51.100.9", None)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        store
            .count_login_attempts("198.51.100.9", Some("c@x.com"))
            .await
            .unwrap(),
        1
    );
    assert_eq!(store.count_login_attempts(TEST_IP, None).await.unwrap(), 0);
}

#[tokio::test]
async fn attempt_counting_matches_ip_or_login() {
    let store = mem_store().await;

    let now = security::format_timestamp(fixed_now());
    store
        .record_login_attempt(TEST_IP, "someone-else", &now)
        .await
        .unwrap();
    store
        .record_login_attempt("198.51.100.9", "ripley", &now)
        .await
        .unwrap();

    let (engine, _) = engine_with(
        &store,
        auth_config(),
        test_ctx(Arc::new(MemorySession::new())),
    )
    .await;

    // A login-only match from a different address also counts.
    assert_eq!(engine.num_login_attempts(Some("ripley")).await.unwrap(), 2);
    assert_eq!(engine.num_login_attempts(None).await.unwrap(), 1);
    assert_eq!(engine.num_login_attempts(Some("")).await.unwrap(), 1);
}

#[tokio::test]
async fn login_destination_follows_configuration() {
    let store = mem_store().await;
    insert_user(
        &store,
        SeedUser {
            login_destination: Some("/dashboard"),
            ..SeedUser::default()
        },
    )
    .await;

    let (engine, _) = engine_with(
        &store,
        auth_config(),
        test_ctx(Arc::new(MemorySession::new())),
    )
    .await;
    engine.login("ripley", PASSWORD, false).await.unwrap();
    assert_eq!(engine.login_destination(), "/dashboard");

    let mut config = auth_config();
    config.do_login_redirect = false;
    let (engine, _) = engine_with(&store, config, test_ctx(Arc::new(MemorySession::new()))).await;
    engine.login("ripley", PASSWORD, false).await.unwrap();
    assert_eq!(engine.login_destination(), "");
}

#[tokio::test]
async fn email_login_type_rejects_usernames() {
    let store = mem_store().await;
    insert_user(&store, SeedUser::default()).await;

    let mut config = auth_config();
    config.login_type = LoginType::Email;

    let (engine, _) = engine_with(&store, config, test_ctx(Arc::new(MemorySession::new()))).await;

    assert!(matches!(
        engine.login("ripley", PASSWORD, false).await,
        Err(AuthError::InvalidCredentials)
    ));
    engine
        .login("ripley@weyland.example", PASSWORD, false)
        .await
        .unwrap();
    assert_eq!(
        engine.identity().await.unwrap().as_deref(),
        Some("ripley@weyland.example")
    );
}
