//! HTTP router

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use super::auth::require_session;
use super::handlers;
use crate::config::CredentialProvider;
use crate::session::SessionStore;

/// Shared application state
pub struct AppState {
    /// Live admin sessions
    pub sessions: Arc<SessionStore>,
    /// Source of the admin credential
    pub credentials: Arc<dyn CredentialProvider>,
}

impl AppState {
    /// Bundle the session store and credential source
    pub fn new(sessions: Arc<SessionStore>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            sessions,
            credentials,
        }
    }
}

/// Create the router
///
/// Routes in `protected` (plus the built-in `GET /api/whoami`) are only
/// reachable with a live session. `/login`, `/logout`, `/session` and
/// `/health` are public.
pub fn create_router(state: Arc<AppState>, protected: Router<Arc<AppState>>) -> Router {
    let protected = protected
        .route("/api/whoami", get(handlers::whoami))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_session,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/login", post(handlers::login))
        .route("/logout", post(handlers::logout))
        .route("/session", get(handlers::session_status))
        .merge(protected)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
