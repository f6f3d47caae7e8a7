//! Login, logout and session handlers

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{ConnectInfo, State, rejection::JsonRejection},
    http::{Extensions, HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};

use super::auth::{clear_cookie, session_cookie, session_token};
use super::router::AppState;
use crate::Error;
use crate::password;
use crate::session::Session;

/// `POST /login` body
#[derive(Deserialize)]
pub struct LoginRequest {
    /// Admin username
    pub username: String,
    /// Plaintext password
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `POST /login` and `POST /logout` response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Whether the operation succeeded
    pub success: bool,
    /// Human-readable outcome
    pub message: &'static str,
}

/// `GET /session` response
#[derive(Debug, Serialize)]
pub struct SessionStatus {
    /// Whether the request carries a live session
    pub authenticated: bool,
    /// Session owner, present only when authenticated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

fn reply(status: StatusCode, success: bool, message: &'static str) -> Response {
    (status, Json(LoginResponse { success, message })).into_response()
}

/// Failure reply; the status follows the error kind, the body stays generic.
fn fail(err: &Error, message: &'static str) -> Response {
    reply(err.status_code(), false, message)
}

/// Client address for audit logs: the peer socket, else `X-Forwarded-For`.
fn remote_addr(extensions: &Extensions, headers: &HeaderMap) -> String {
    if let Some(ConnectInfo(addr)) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return addr.to_string();
    }
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

/// POST /login
pub(super) async fn login(
    State(state): State<Arc<AppState>>,
    extensions: Extensions,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let err = Error::Validation(rejection.body_text());
            debug!(error = %err, "Rejected malformed login body");
            return fail(&err, "Invalid request");
        }
    };

    let Some(credentials) = state.credentials.admin_credentials() else {
        let err = Error::Config("admin credentials are not configured".into());
        error!(error = %err, "Login attempted on an unconfigured server");
        return fail(&err, "Server not configured");
    };

    let remote = remote_addr(&extensions, &headers);

    // Always run bcrypt so a wrong username costs the same as a wrong password
    let username_ok: bool = request
        .username
        .as_bytes()
        .ct_eq(credentials.username.as_bytes())
        .into();
    let password_ok =
        match password::verify_password_blocking(request.password, credentials.password_hash)
            .await
        {
            Ok(ok) => ok,
            Err(e) => {
                error!(error = %e, "Password verification failed");
                return fail(&e, "Internal server error");
            }
        };

    if !(username_ok && password_ok) {
        warn!(remote = %remote, username = %request.username, "Failed login attempt");
        return fail(&Error::Authentication, "Invalid credentials");
    }

    let session = match state.sessions.create(&request.username) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "Failed to create session");
            return fail(&e, "Internal server error");
        }
    };

    let cookie = match session_cookie(
        &session.token,
        state.sessions.ttl(),
        credentials.https_enabled,
    ) {
        Ok(cookie) => cookie,
        Err(e) => {
            state.sessions.delete(&session.token);
            error!(error = %e, "Failed to build session cookie");
            return fail(&e, "Internal server error");
        }
    };

    info!(username = %session.username, remote = %remote, "Admin logged in");

    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            success: true,
            message: "Login successful",
        }),
    )
        .into_response()
}

/// POST /logout
pub(super) async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.sessions.delete(token);
        info!("Admin logged out");
    }

    let secure = state
        .credentials
        .admin_credentials()
        .is_some_and(|c| c.https_enabled);

    (
        StatusCode::OK,
        [(header::SET_COOKIE, clear_cookie(secure))],
        Json(LoginResponse {
            success: true,
            message: "Logged out",
        }),
    )
        .into_response()
}

/// GET /session
pub(super) async fn session_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<SessionStatus> {
    let session = session_token(&headers).and_then(|token| state.sessions.get(token));

    Json(SessionStatus {
        authenticated: session.is_some(),
        username: session.map(|s| s.username),
    })
}

/// GET /api/whoami (behind `require_session`)
pub(super) async fn whoami(Extension(session): Extension<Session>) -> Json<Value> {
    Json(json!({
        "username": session.username,
        "expires_at": session.expires_at,
    }))
}

/// GET /health
pub(super) async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
