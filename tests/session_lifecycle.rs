//! Session state machine lifecycle tests.
//!
//! Runs the session manager against a mock HTTP server and checks the
//! transition contract: bootstrap restores or degrades, login/signup/logout
//! always land in a well-defined state, and no failure path ever leaves the
//! session stuck in `Loading` or holding half a credential pair.

use csvdock::api::ApiClient;
use csvdock::credentials::{CredentialStore, MemoryCredentialStore, TokenPair};
use csvdock::gateway::{Gateway, GatewayError, NoRefresh};
use csvdock::routes::{NavTarget, Navigator};
use csvdock::session::{SessionManager, SessionStatus, SessionStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    manager: SessionManager,
    session: SessionStore,
    store: Arc<MemoryCredentialStore>,
    nav_rx: mpsc::UnboundedReceiver<NavTarget>,
}

fn harness(server: &MockServer, seeded: Option<TokenPair>) -> Harness {
    let store = Arc::new(MemoryCredentialStore::new());
    if let Some(pair) = seeded {
        store.save(&pair);
    }

    let session = SessionStore::new(SessionManager::initial_session(store.as_ref()));
    let (navigator, nav_rx) = Navigator::new();
    let gateway = Arc::new(Gateway::new(
        server.uri(),
        store.clone() as Arc<dyn CredentialStore>,
        Arc::new(NoRefresh),
        session.clone(),
        navigator,
    ));
    let manager = SessionManager::new(
        ApiClient::new(gateway),
        store.clone(),
        session.clone(),
    );

    Harness {
        manager,
        session,
        store,
        nav_rx,
    }
}

fn pair(access: &str) -> TokenPair {
    TokenPair {
        access_token: access.into(),
        refresh_token: format!("refresh-{access}"),
    }
}

async fn mock_login_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "tok-1",
            "refresh_token": "ref-1",
            "token_type": "bearer"
        })))
        .mount(server)
        .await;
}

async fn mock_me(server: &MockServer, username: &str, role: &str) {
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 1,
            "username": username,
            "role": role
        })))
        .mount(server)
        .await;
}

// ── Bootstrap ───────────────────────────────────────────────────────

#[tokio::test]
async fn bootstrap_restores_persisted_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 1,
            "username": "alice",
            "role": "user"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, Some(pair("tok-1")));
    assert_eq!(h.session.status(), SessionStatus::Loading);

    assert_eq!(h.manager.bootstrap().await, SessionStatus::Authenticated);

    let session = h.session.snapshot();
    assert_eq!(session.user().unwrap().username, "alice");
    assert!(!h.manager.is_admin());
}

#[tokio::test]
async fn bootstrap_without_token_is_anonymous_and_issues_no_requests() {
    let server = MockServer::start().await;
    let h = harness(&server, None);

    assert_eq!(h.session.status(), SessionStatus::Anonymous);
    assert_eq!(h.manager.bootstrap().await, SessionStatus::Anonymous);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn bootstrap_with_rejected_token_degrades_to_anonymous() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({"detail": "Could not validate credentials"})),
        )
        .mount(&server)
        .await;

    let mut h = harness(&server, Some(pair("stale")));
    assert_eq!(h.manager.bootstrap().await, SessionStatus::Anonymous);

    // Never stuck in Loading, stale pair dropped, host sent to login.
    assert_eq!(h.session.status(), SessionStatus::Anonymous);
    assert!(h.store.load().is_none());
    assert_eq!(h.nav_rx.try_recv().ok(), Some(NavTarget::Login));
}

// ── Login / logout ──────────────────────────────────────────────────

#[tokio::test]
async fn login_then_logout_ends_anonymous_with_empty_store() {
    let server = MockServer::start().await;
    mock_login_ok(&server).await;
    mock_me(&server, "alice", "user").await;

    let h = harness(&server, None);
    let user = h.manager.login("alice", "pw").await.unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(h.session.status(), SessionStatus::Authenticated);
    assert!(h.store.load().is_some());

    h.manager.logout();
    assert_eq!(h.session.status(), SessionStatus::Anonymous);
    assert!(h.store.load().is_none());
}

#[tokio::test]
async fn login_persists_the_returned_pair() {
    let server = MockServer::start().await;
    mock_login_ok(&server).await;
    mock_me(&server, "alice", "admin").await;

    let h = harness(&server, None);
    h.manager.login("alice", "pw").await.unwrap();

    let stored = h.store.load().unwrap();
    assert_eq!(stored.access_token, "tok-1");
    assert_eq!(stored.refresh_token, "ref-1");
    assert!(h.manager.is_admin());
}

#[tokio::test]
async fn rejected_login_leaves_state_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({"detail": "Incorrect username or password"})),
        )
        .mount(&server)
        .await;

    let h = harness(&server, None);
    let err = h.manager.login("bob", "x").await.unwrap_err();

    assert_eq!(err.to_string(), "Incorrect username or password");
    assert_eq!(h.session.status(), SessionStatus::Anonymous);
    assert!(h.store.load().is_none());
}

#[tokio::test]
async fn identity_failure_after_login_drops_the_fresh_pair() {
    let server = MockServer::start().await;
    mock_login_ok(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let h = harness(&server, None);
    assert!(h.manager.login("alice", "pw").await.is_err());

    assert_eq!(h.session.status(), SessionStatus::Anonymous);
    assert!(h.store.load().is_none());
}

// ── Signup ──────────────────────────────────────────────────────────

#[tokio::test]
async fn signup_logs_in_only_after_registration_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 2,
            "username": "bob",
            "role": "user"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mock_login_ok(&server).await;
    mock_me(&server, "bob", "user").await;

    let h = harness(&server, None);
    let user = h.manager.signup("bob", "pw").await.unwrap();
    assert_eq!(user.username, "bob");
    assert_eq!(h.session.status(), SessionStatus::Authenticated);

    let requests = server.received_requests().await.unwrap();
    let paths: Vec<_> = requests.iter().map(|r| r.url.path().to_string()).collect();
    assert_eq!(paths, vec!["/api/auth/signup", "/api/auth/login", "/api/auth/me"]);
}

#[tokio::test]
async fn duplicate_signup_surfaces_conflict_and_changes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/signup"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({"detail": "Username already registered"})),
        )
        .mount(&server)
        .await;

    let h = harness(&server, None);
    let err = h.manager.signup("bob", "pw").await.unwrap_err();

    assert!(matches!(err, GatewayError::Api { status: 400, .. }));
    assert_eq!(err.to_string(), "Username already registered");
    assert_eq!(h.session.status(), SessionStatus::Anonymous);
    assert!(h.store.load().is_none());

    // The embedded login must not have been attempted.
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/api/auth/login"));
}

#[tokio::test]
async fn signup_with_failing_embedded_login_leaves_no_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 2,
            "username": "bob",
            "role": "user"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({"detail": "Incorrect username or password"})),
        )
        .mount(&server)
        .await;

    let h = harness(&server, None);
    assert!(h.manager.signup("bob", "pw").await.is_err());
    assert!(h.session.snapshot().user().is_none());
    assert!(h.store.load().is_none());
}
