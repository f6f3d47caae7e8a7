//! Session-cookie authentication for the admin console
//!
//! - `vpn_session` cookie carrying the session token
//! - `require_session` middleware guarding protected routes

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;

use super::router::AppState;
use crate::{Error, Result};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "vpn_session";

const CLEAR_COOKIE: &str = "vpn_session=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0";
const CLEAR_COOKIE_SECURE: &str =
    "vpn_session=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0; Secure";

/// Extract the session token from the request's `Cookie` headers.
///
/// An empty cookie value counts as absent.
#[must_use]
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token)
        .filter(|token| !token.is_empty())
}

/// `Set-Cookie` value establishing a session.
pub(crate) fn session_cookie(token: &str, ttl: Duration, secure: bool) -> Result<HeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        ttl.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::try_from(cookie).map_err(|e| Error::Internal(format!("invalid cookie: {e}")))
}

/// `Set-Cookie` value expiring the session cookie immediately.
pub(crate) fn clear_cookie(secure: bool) -> HeaderValue {
    HeaderValue::from_static(if secure {
        CLEAR_COOKIE_SECURE
    } else {
        CLEAR_COOKIE
    })
}

/// Reject requests without a live session; otherwise expose the
/// [`Session`](crate::session::Session) to downstream handlers as an extension.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let session = session_token(request.headers()).and_then(|token| state.sessions.get(token));

    let Some(session) = session else {
        debug!(path = %request.uri().path(), "Rejected request without a valid session");
        return unauthorized_response();
    };

    debug!(username = %session.username, path = %request.uri().path(), "Authenticated request");
    request.extensions_mut().insert(session);
    next.run(request).await
}

/// Uniform 401 for every session failure
fn unauthorized_response() -> Response {
    let err = Error::Authentication;
    (err.status_code(), Json(json!({ "error": err.to_string() }))).into_response()
}
