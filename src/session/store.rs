//! In-memory session registry.
//!
//! [`SessionStore`] maps opaque tokens to [`Session`]s behind a
//! reader/writer lock: lookups proceed in parallel, while `create`,
//! `delete` and purges are exclusive. The lock is never held across an
//! `.await`.
//!
//! Expired sessions are removed two ways:
//!
//! - **On read**: `get` reports an expired session as absent and hands the
//!   removal to a background task, so the read path never waits for the
//!   write lock. Two near-simultaneous reads of a just-expired token may
//!   both see it; TTL enforcement is approximate anyway.
//! - **Periodically**: [`SessionStore::spawn_cleanup`] purges everything
//!   past its expiry on a fixed interval.
//!
//! Both kinds of task are tracked and stop on [`SessionStore::shutdown`].

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use super::Session;
use crate::random::{self, SecureRandom};
use crate::{Error, Result};

/// Session lifetime used when none is configured.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Interval of the background purge used when none is configured.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Token entropy in bytes (256 bits).
const TOKEN_BYTES: usize = 32;

type SessionMap = Arc<RwLock<HashMap<String, Session>>>;

/// Concurrency-safe registry of live sessions.
///
/// Construct one per process, wrap it in an `Arc`, and share it with every
/// handler. Nothing outside the store touches the map.
pub struct SessionStore {
    sessions: SessionMap,
    ttl: Duration,
    rng: Arc<dyn SecureRandom>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl SessionStore {
    /// Create an empty store issuing sessions valid for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration, rng: Arc<dyn SecureRandom>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            rng,
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Lifetime of newly created sessions.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue and register a new session for `username`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if the random source fails, yields an
    /// all-zero token, or yields a token that is already live. Nothing is
    /// registered in any of those cases.
    pub fn create(&self, username: &str) -> Result<Session> {
        let bytes: [u8; TOKEN_BYTES] = random::nonzero_bytes(self.rng.as_ref())?;
        let token = hex::encode(bytes);

        let ttl = TimeDelta::from_std(self.ttl)
            .map_err(|e| Error::Config(format!("Session TTL out of range: {e}")))?;
        let created_at = Utc::now();
        let expires_at = created_at
            .checked_add_signed(ttl)
            .ok_or_else(|| Error::Config("Session TTL overflows the calendar".to_string()))?;

        let session = Session {
            token: token.clone(),
            username: username.to_string(),
            created_at,
            expires_at,
        };

        match self.sessions.write().entry(token) {
            Entry::Occupied(_) => Err(Error::crypto("session token collision")),
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
                Ok(session)
            }
        }
    }

    /// Look up a live session.
    ///
    /// Returns `None` for empty, unknown and expired tokens alike. An expired
    /// hit is evicted by a background task; without a tokio runtime it is
    /// left for the periodic purge.
    #[must_use]
    pub fn get(&self, token: &str) -> Option<Session> {
        if token.is_empty() {
            return None;
        }

        let session = self.sessions.read().get(token).cloned()?;

        if session.is_expired() {
            self.schedule_eviction(token);
            return None;
        }

        Some(session)
    }

    /// Remove a session. Removing an absent token is a no-op.
    pub fn delete(&self, token: &str) {
        self.sessions.write().remove(token);
    }

    /// Remove every expired session and return how many were removed.
    pub fn cleanup(&self) -> usize {
        purge_expired(&self.sessions)
    }

    /// Number of registered sessions, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Start the periodic purge. Must be called from within a tokio runtime.
    ///
    /// The task runs until [`shutdown`](Self::shutdown).
    pub fn spawn_cleanup(&self, interval: Duration) {
        let sessions = Arc::clone(&self.sessions);
        let cancel = self.shutdown.clone();
        let period = interval.max(Duration::from_millis(1));

        self.tasks.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purged = purge_expired(&sessions);
                        if purged > 0 {
                            debug!(count = purged, "Purged expired sessions");
                        }
                    }
                    () = cancel.cancelled() => {
                        debug!("Session cleanup shutting down");
                        break;
                    }
                }
            }
        });
    }

    /// Stop all background work and wait for it to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    fn schedule_eviction(&self, token: &str) {
        let Ok(handle) = Handle::try_current() else {
            debug!("No runtime for eviction, expired session left for cleanup");
            return;
        };

        let sessions = Arc::clone(&self.sessions);
        let cancel = self.shutdown.clone();
        let token = token.to_owned();

        self.tasks.spawn_on(
            async move {
                if cancel.is_cancelled() {
                    return;
                }
                let now = Utc::now();
                let mut map = sessions.write();
                if map.get(&token).is_some_and(|s| s.is_expired_at(now)) {
                    map.remove(&token);
                    debug!("Evicted expired session");
                }
            },
            &handle,
        );
    }

    #[cfg(test)]
    fn insert(&self, session: Session) {
        self.sessions.write().insert(session.token.clone(), session);
    }

    /// Wait for in-flight background evictions without stopping the store.
    #[cfg(test)]
    async fn settle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}

fn purge_expired(sessions: &SessionMap) -> usize {
    let now = Utc::now();
    let mut map = sessions.write();
    let before = map.len();
    map.retain(|_, s| !s.is_expired_at(now));
    before - map.len()
}
