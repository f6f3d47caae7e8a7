//! Error types for the VPN console

use std::io;

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for the VPN console
pub type Result<T> = std::result::Result<T, Error>;

/// VPN console errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing or unusable settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed client input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bad credentials or a missing, unknown or expired session.
    ///
    /// Carries no detail on purpose: every cause renders identically.
    #[error("Unauthorized")]
    Authentication,

    /// Randomness, key generation or signing failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Malformed PEM/DER or an unrecognized key encoding
    #[error("Parse error: {0}")]
    Parse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code this error maps to when it reaches a handler
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Parse(_) => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Config(_)
            | Self::Crypto(_)
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Shorthand for [`Error::Crypto`]
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto(message.into())
    }

    /// Shorthand for [`Error::Parse`]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}
