//! Configuration management

use std::{env, path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::password;
use crate::pki::SUPPORTED_KEY_BITS;
use crate::session::{DEFAULT_CLEANUP_INTERVAL, DEFAULT_SESSION_TTL};
use crate::{Error, Result};

/// Upper bound for `auth.session_ttl` and `auth.cleanup_interval`.
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before applying the legacy overrides.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Admin authentication configuration
    pub auth: AuthConfig,
    /// Certificate authority configuration
    pub pki: PkiConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Admin authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Admin username. Empty means "not configured".
    pub username: String,
    /// bcrypt hash of the admin password. Empty means "not configured".
    pub password_hash: String,
    /// Mark session cookies `Secure`
    pub https_enabled: bool,
    /// Session lifetime
    #[serde(with = "humantime_serde")]
    pub session_ttl: Duration,
    /// Interval between expired-session sweeps
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// bcrypt work factor for hashing `ADMIN_PASSWORD`
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password_hash: String::new(),
            https_enabled: false,
            session_ttl: DEFAULT_SESSION_TTL,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            bcrypt_cost: password::DEFAULT_COST,
        }
    }
}

/// Certificate authority configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PkiConfig {
    /// Directory holding `ca.crt` / `ca.key`
    pub dir: PathBuf,
    /// RSA modulus size for new keys
    pub key_bits: u32,
}

impl Default for PkiConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("pki"),
            key_bits: 2048,
        }
    }
}

/// The admin credential as read from configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    /// Admin username
    pub username: String,
    /// bcrypt hash of the admin password
    pub password_hash: String,
    /// Whether the console is served over HTTPS
    pub https_enabled: bool,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("https_enabled", &self.https_enabled)
            .finish()
    }
}

/// Read-only source of the admin credential.
pub trait CredentialProvider: Send + Sync + 'static {
    /// The configured credential, or `None` if the server is not configured.
    fn admin_credentials(&self) -> Option<AdminCredentials>;
}

impl CredentialProvider for AuthConfig {
    fn admin_credentials(&self) -> Option<AdminCredentials> {
        if self.username.is_empty() || self.password_hash.is_empty() {
            return None;
        }
        Some(AdminCredentials {
            username: self.username.clone(),
            password_hash: self.password_hash.clone(),
            https_enabled: self.https_enabled,
        })
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is not found, cannot be parsed,
    /// or holds invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (VPN_CONSOLE_ prefix)
        figment = figment.merge(Env::prefixed("VPN_CONSOLE_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before legacy overrides)
        config.load_env_files();

        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = expand_home(path_str);
            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Apply the legacy `ADMIN_USERNAME` / `ADMIN_PASSWORD` / `DOMAIN`
    /// variables on top of the loaded settings. Empty values are ignored.
    ///
    /// `ADMIN_PASSWORD` is plaintext and is stored only as its bcrypt hash.
    /// A non-empty `DOMAIN` means the console sits behind TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the password cannot be hashed.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(username) = present("ADMIN_USERNAME") {
            self.auth.username = username;
        }
        if let Some(plaintext) = present("ADMIN_PASSWORD") {
            self.auth.password_hash = password::hash_password(&plaintext, self.auth.bcrypt_cost)
                .map_err(|e| Error::Config(format!("Cannot hash ADMIN_PASSWORD: {e}")))?;
        }
        if let Some(domain) = present("DOMAIN") {
            tracing::debug!(domain = %domain, "DOMAIN set, enabling secure cookies");
            self.auth.https_enabled = true;
        }
        Ok(())
    }

    /// Reject settings that cannot work at runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending setting.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("auth.session_ttl", self.auth.session_ttl),
            ("auth.cleanup_interval", self.auth.cleanup_interval),
        ] {
            if value.is_zero() {
                return Err(Error::Config(format!("{name} must be positive")));
            }
            if value > MAX_DURATION {
                return Err(Error::Config(format!(
                    "{name} must not exceed {} days",
                    MAX_DURATION.as_secs() / 86_400
                )));
            }
        }
        if !SUPPORTED_KEY_BITS.contains(&self.pki.key_bits) {
            return Err(Error::Config(format!(
                "pki.key_bits must be one of {SUPPORTED_KEY_BITS:?}, got {}",
                self.pki.key_bits
            )));
        }
        Ok(())
    }
}

fn expand_home(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.display().to_string(), 1);
        }
    }
    path.to_string()
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "24h", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(s.trim()).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse(s: &str) -> Result<Duration, String> {
        let (digits, unit_secs) = if let Some(ms) = s.strip_suffix("ms") {
            // "ms" before "s": "100ms" also ends in 's'
            let millis = ms
                .parse::<u64>()
                .map_err(|e| format!("invalid duration '{s}': {e}"))?;
            return Ok(Duration::from_millis(millis));
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, 1)
        } else if let Some(mins) = s.strip_suffix('m') {
            (mins, 60)
        } else if let Some(hours) = s.strip_suffix('h') {
            (hours, 3600)
        } else {
            // Assume seconds
            (s, 1)
        };

        let value = digits
            .parse::<u64>()
            .map_err(|e| format!("invalid duration '{s}': {e}"))?;
        value
            .checked_mul(unit_secs)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    }
}
