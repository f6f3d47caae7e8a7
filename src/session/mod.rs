//! Administrator sessions.
//!
//! A successful login yields a [`Session`] bound to a 256-bit random token.
//! The token travels in an `HttpOnly` cookie and is resolved on every
//! protected request through [`SessionStore::get`].
//!
//! # Lifecycle
//!
//! ```text
//! create ──► live ──► expires_at <= now ──► evicted (on read, background)
//!              │                        └─► purged (periodic cleanup)
//!              └──► delete (logout)
//! ```
//!
//! Sessions live in process memory only; a restart logs everyone out.

mod store;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use store::{DEFAULT_CLEANUP_INTERVAL, DEFAULT_SESSION_TTL, SessionStore};

/// An authenticated administrator session. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// 64-char lowercase hex encoding of 32 random bytes.
    #[serde(skip_serializing)]
    pub token: String,
    /// Username the session was issued to.
    pub username: String,
    /// Issued-at.
    pub created_at: DateTime<Utc>,
    /// `created_at + ttl`.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A session is expired from the instant `expires_at` is reached.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Returns `true` if the session has reached its expiry time.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
