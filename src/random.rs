//! Secure randomness source shared by session tokens and certificate serials.
//!
//! Production code uses [`SystemRandom`], which reads straight from the
//! operating system. Tests can inject [`SeededRandom`], a ChaCha-based CSPRNG
//! that is reproducible from its seed but otherwise indistinguishable from
//! random output.

use parking_lot::Mutex;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng, TryRngCore};

use crate::{Error, Result};

/// A cryptographically secure source of random bytes.
///
/// Implementations must be `Send + Sync`: one instance is shared by the
/// session store and the certificate authority across tasks.
pub trait SecureRandom: Send + Sync + 'static {
    /// Fill `dest` entirely with random bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Crypto`] if the source cannot produce output. Callers
    /// must treat this as fatal for the operation in progress.
    fn fill(&self, dest: &mut [u8]) -> Result<()>;
}

/// OS-backed randomness (`getrandom`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRandom;

impl SecureRandom for SystemRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| Error::crypto(format!("OS random source failed: {e}")))
    }
}

/// Seeded CSPRNG for tests and reproducible fixtures.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Create a source seeded from a 64-bit value.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl SecureRandom for SeededRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<()> {
        self.rng.lock().fill_bytes(dest);
        Ok(())
    }
}

/// Draw `N` random bytes, rejecting an all-zero draw.
///
/// An all-zero value is what a silently broken source most often returns, and
/// it is never acceptable as a token or serial number.
pub(crate) fn nonzero_bytes<const N: usize>(rng: &dyn SecureRandom) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    rng.fill(&mut buf)?;
    if buf.iter().all(|b| *b == 0) {
        return Err(Error::crypto("random source returned all-zero output"));
    }
    Ok(buf)
}
