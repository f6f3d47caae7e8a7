//! bcrypt password hashing for the admin credential.

use crate::{Error, Result};

/// Work factor used when none is configured.
pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

/// Hash `password` with bcrypt at `cost` (4..=31).
///
/// # Errors
///
/// Returns [`Error::Validation`] for an out-of-range cost.
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).map_err(|e| Error::Validation(format!("bcrypt: {e}")))
}

/// Check `password` against a bcrypt `hash`.
///
/// A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(ok) => ok,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is not valid bcrypt");
            false
        }
    }
}

/// [`verify_password`] on the blocking pool, keeping bcrypt's deliberate
/// slowness off the async workers.
///
/// # Errors
///
/// Returns [`Error::Internal`] if the blocking task panics or is cancelled.
pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| Error::Internal(format!("password verification task failed: {e}")))
}
