//! VPN Console Library
//!
//! Security core of a VPN management console.
//!
//! # Features
//!
//! - **Admin sessions**: bcrypt-checked login, 256-bit cookie tokens, TTL expiry
//!   with background eviction and periodic cleanup
//! - **Certificate authority**: RSA root CA plus server/client leaf issuance for
//!   mutual-TLS VPN authentication, PEM import/export, chain verification
//! - **HTTP console**: axum router with login/logout/session endpoints and a
//!   session-guarded extension point for management routes

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod password;
pub mod pki;
pub mod random;
pub mod session;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`. `format` selects `json` or text output.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Internal(format!("tracing already initialised: {e}")))?,
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Internal(format!("tracing already initialised: {e}")))?,
    }

    Ok(())
}
