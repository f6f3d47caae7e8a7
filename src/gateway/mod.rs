//! Admin console HTTP surface

pub mod auth;
pub mod handlers;
mod router;
mod server;

pub use auth::{SESSION_COOKIE, require_session, session_token};
pub use router::{AppState, create_router};
pub use server::Gateway;
