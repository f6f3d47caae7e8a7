//! End-to-end admin authentication tests
//!
//! Drives the console router in-process:
//! - Login / logout / session status
//! - Session cookie attributes
//! - Protected routes behind `require_session`

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
    routing::get,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

use vpn_console::config::AuthConfig;
use vpn_console::gateway::{AppState, create_router};
use vpn_console::password::hash_password;
use vpn_console::random::SystemRandom;
use vpn_console::session::{DEFAULT_SESSION_TTL, SessionStore};

const USERNAME: &str = "admin";
const PASSWORD: &str = "correct horse battery staple";

fn auth_config(https_enabled: bool) -> AuthConfig {
    AuthConfig {
        username: USERNAME.to_string(),
        password_hash: hash_password(PASSWORD, 4).unwrap(),
        https_enabled,
        ..AuthConfig::default()
    }
}

fn console(config: AuthConfig, ttl: Duration) -> (Router, Arc<SessionStore>) {
    console_with_routes(config, ttl, Router::new())
}

fn console_with_routes(
    config: AuthConfig,
    ttl: Duration,
    protected: Router<Arc<AppState>>,
) -> (Router, Arc<SessionStore>) {
    let sessions = Arc::new(SessionStore::new(ttl, Arc::new(SystemRandom)));
    let state = Arc::new(AppState::new(Arc::clone(&sessions), Arc::new(config)));
    (create_router(state, protected), sessions)
}

fn login_request(username: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "username": username, "password": password }).to_string(),
        ))
        .unwrap()
}

fn get_with_cookie(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_with_cookie(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(c) = cookie {
        builder = builder.header(header::COOKIE, c);
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string())
}

/// `name=value` part of a `Set-Cookie` header, usable as a `Cookie` header.
fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}

async fn login(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(login_request(USERNAME, PASSWORD))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    cookie_pair(&set_cookie(&response).unwrap())
}

#[tokio::test]
async fn test_login_protected_logout_round_trip() {
    // GIVEN: a configured console
    let (app, sessions) = console(auth_config(false), DEFAULT_SESSION_TTL);

    // WHEN: the admin logs in
    let response = app
        .clone()
        .oneshot(login_request(USERNAME, PASSWORD))
        .await
        .unwrap();

    // THEN: a session cookie is issued
    assert_eq!(response.status(), StatusCode::OK);
    let set = set_cookie(&response).unwrap();
    assert!(set.starts_with("vpn_session="));
    assert!(set.contains("Path=/"));
    assert!(set.contains("HttpOnly"));
    assert!(set.contains("SameSite=Strict"));
    assert!(set.contains("Max-Age=86400"));
    assert!(!set.contains("Secure"));
    assert_eq!(
        json_body(response).await,
        json!({ "success": true, "message": "Login successful" })
    );
    assert_eq!(sessions.len(), 1);

    let token = cookie_pair(&set);
    assert_eq!(token.len(), "vpn_session=".len() + 64);

    // AND: the protected route is reachable
    let response = app
        .clone()
        .oneshot(get_with_cookie("/api/whoami", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["username"], USERNAME);

    // WHEN: the admin logs out
    let response = app
        .clone()
        .oneshot(post_with_cookie("/logout", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = set_cookie(&response).unwrap();
    assert!(cleared.starts_with("vpn_session=;"));
    assert!(cleared.contains("Max-Age=0"));
    assert_eq!(
        json_body(response).await,
        json!({ "success": true, "message": "Logged out" })
    );

    // THEN: the old cookie no longer works
    let response = app
        .clone()
        .oneshot(get_with_cookie("/api/whoami", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await, json!({ "error": "Unauthorized" }));
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn test_wrong_password_is_rejected_without_cookie() {
    let (app, sessions) = console(auth_config(false), DEFAULT_SESSION_TTL);

    let response = app
        .oneshot(login_request(USERNAME, "incorrect"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(&response).is_none());
    assert_eq!(
        json_body(response).await,
        json!({ "success": false, "message": "Invalid credentials" })
    );
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn test_wrong_username_is_rejected_identically() {
    let (app, sessions) = console(auth_config(false), DEFAULT_SESSION_TTL);

    let response = app
        .oneshot(login_request("administrator", PASSWORD))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await,
        json!({ "success": false, "message": "Invalid credentials" })
    );
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn test_malformed_login_body_is_bad_request() {
    let (app, _) = console(auth_config(false), DEFAULT_SESSION_TTL);

    let bodies = [
        ("application/json", "not json"),
        ("application/json", r#"{"username":"admin"}"#),
        ("text/plain", r#"{"username":"admin","password":"x"}"#),
    ];

    for (content_type, body) in bodies {
        let request = Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body:?}");
        assert_eq!(
            json_body(response).await,
            json!({ "success": false, "message": "Invalid request" })
        );
    }
}

#[tokio::test]
async fn test_unconfigured_server_refuses_login() {
    let (app, sessions) = console(AuthConfig::default(), DEFAULT_SESSION_TTL);

    let response = app
        .oneshot(login_request(USERNAME, PASSWORD))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await,
        json!({ "success": false, "message": "Server not configured" })
    );
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn test_secure_flag_follows_https_setting() {
    let (app, _) = console(auth_config(true), DEFAULT_SESSION_TTL);

    let response = app
        .clone()
        .oneshot(login_request(USERNAME, PASSWORD))
        .await
        .unwrap();
    let set = set_cookie(&response).unwrap();
    assert!(set.ends_with("; Secure"));

    let response = app
        .oneshot(post_with_cookie("/logout", Some(&cookie_pair(&set))))
        .await
        .unwrap();
    assert!(set_cookie(&response).unwrap().ends_with("; Secure"));
}

#[tokio::test]
async fn test_cookie_max_age_follows_ttl() {
    let (app, _) = console(auth_config(false), Duration::from_secs(15 * 60));

    let response = app
        .oneshot(login_request(USERNAME, PASSWORD))
        .await
        .unwrap();
    assert!(set_cookie(&response).unwrap().contains("Max-Age=900"));
}

#[tokio::test]
async fn test_session_status_reports_authentication() {
    let (app, _) = console(auth_config(false), DEFAULT_SESSION_TTL);

    // Without a cookie
    let response = app
        .clone()
        .oneshot(get_with_cookie("/session", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "authenticated": false }));

    // With an unknown token
    let response = app
        .clone()
        .oneshot(get_with_cookie("/session", Some("vpn_session=deadbeef")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "authenticated": false }));

    // After login
    let cookie = login(&app).await;
    let response = app
        .oneshot(get_with_cookie("/session", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(
        json_body(response).await,
        json!({ "authenticated": true, "username": USERNAME })
    );
}

#[tokio::test]
async fn test_protected_route_rejects_all_failures_uniformly() {
    let (app, _) = console(auth_config(false), DEFAULT_SESSION_TTL);

    let cookies = [
        None,
        Some("vpn_session="),
        Some("vpn_session=0123456789abcdef"),
        Some("other=value"),
    ];

    for cookie in cookies {
        let response = app
            .clone()
            .oneshot(get_with_cookie("/api/whoami", cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "cookie {cookie:?}");
        assert_eq!(json_body(response).await, json!({ "error": "Unauthorized" }));
    }
}

#[tokio::test]
async fn test_expired_session_is_rejected() {
    // Zero TTL: sessions expire the instant they are created
    let (app, _) = console(auth_config(false), Duration::ZERO);
    let cookie = login(&app).await;

    let response = app
        .clone()
        .oneshot(get_with_cookie("/api/whoami", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await, json!({ "error": "Unauthorized" }));

    let response = app
        .oneshot(get_with_cookie("/session", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(json_body(response).await, json!({ "authenticated": false }));
}

#[tokio::test]
async fn test_caller_routes_are_guarded() {
    // GIVEN: a management route supplied by the embedding application
    let routes = Router::new().route("/api/vpn/status", get(|| async { "up" }));
    let (app, _) = console_with_routes(auth_config(false), DEFAULT_SESSION_TTL, routes);

    // THEN: it needs a session
    let response = app
        .clone()
        .oneshot(get_with_cookie("/api/vpn/status", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let cookie = login(&app).await;
    let response = app
        .oneshot(get_with_cookie("/api/vpn/status", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"up");
}

#[tokio::test]
async fn test_logout_without_session_still_clears_cookie() {
    let (app, _) = console(auth_config(false), DEFAULT_SESSION_TTL);

    let response = app.oneshot(post_with_cookie("/logout", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response).unwrap().contains("Max-Age=0"));
    assert_eq!(
        json_body(response).await,
        json!({ "success": true, "message": "Logged out" })
    );
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _) = console(AuthConfig::default(), DEFAULT_SESSION_TTL);

    let response = app
        .oneshot(get_with_cookie("/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

/// Collects formatted log lines for inspection.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

#[tokio::test]
async fn test_failed_login_never_logs_the_password() {
    // GIVEN: every event captured at trace level on this thread
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (app, _) = console(auth_config(false), DEFAULT_SESSION_TTL);
    let attempted = "Tr0ub4dor&3-not-the-password";

    // WHEN: a login fails with a wrong password, then with a malformed body
    let response = app
        .clone()
        .oneshot(login_request(USERNAME, attempted))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let malformed = Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(format!(r#"{{"password":"{attempted}"}}"#)))
        .unwrap();
    let response = app.clone().oneshot(malformed).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // THEN: the failure is logged with the username only
    let text = logs.text();
    assert!(text.contains("Failed login attempt"), "logs: {text}");
    assert!(text.contains(USERNAME));
    assert!(!text.contains(attempted), "password leaked: {text}");
    assert!(!text.contains(PASSWORD));
}
