//! Configuration file parser for ~/.config/cereal/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Credentials from `SERIALIZED_ACCESS_KEY` / `SERIALIZED_SECRET_ACCESS_KEY`
//! take precedence over the file.
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::client::{DEFAULT_BASE_URL, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT};

pub const ACCESS_KEY_ENV: &str = "SERIALIZED_ACCESS_KEY";
pub const SECRET_ACCESS_KEY_ENV: &str = "SERIALIZED_SECRET_ACCESS_KEY";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Client configuration.
///
/// Every key is optional; missing ones take the values of `Config::default()`.
/// Credentials are wrapped in [`SecretString`] and masked in `Debug` output.
#[derive(Deserialize)]
#[serde(default)]
pub struct Config {
    /// API base URL. Must be HTTPS except for localhost.
    pub base_url: String,

    /// Access key sent as `Serialized-Access-Key`.
    #[serde(deserialize_with = "deserialize_secret")]
    pub access_key: Option<SecretString>,

    /// Secret access key sent as `Serialized-Secret-Access-Key`.
    #[serde(deserialize_with = "deserialize_secret")]
    pub secret_access_key: Option<SecretString>,

    /// How long the feed consumer waits between polls once caught up.
    pub poll_interval_ms: u64,

    /// Per-request deadline in seconds.
    pub request_timeout_secs: u64,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_key: None,
            secret_access_key: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field(
                "access_key",
                &self.access_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] = [
        "base_url",
        "access_key",
        "secret_access_key",
        "poll_interval_ms",
        "request_timeout_secs",
    ];

    /// Default location: `~/.config/cereal/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("cereal")
                .join("config.toml")
        })
    }

    /// Reads the config file at `path`.
    ///
    /// A missing or blank file gives the defaults. Unknown keys are logged
    /// and ignored; malformed TOML and files over 1 MiB are errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match Self::read_bounded(path) {
            Ok(content) => content,
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e),
        };
        Self::parse(&content, path)
    }

    fn read_bounded(path: &Path) -> Result<String, ConfigError> {
        let mut file = std::fs::File::open(path)?;
        let size = file.metadata()?.len();
        if size > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "{} is {size} bytes, limit is {}",
                path.display(),
                Self::MAX_FILE_SIZE
            )));
        }

        let mut content = String::with_capacity(size as usize);
        std::io::Read::read_to_string(&mut file, &mut content)?;
        Ok(content)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Blank config file, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, path = %path.display(), "Ignoring unknown config key");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(path = %path.display(), base_url = %config.base_url, "Loaded configuration");
        Ok(config)
    }

    /// Overrides credentials from the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup(ACCESS_KEY_ENV).filter(|k| !k.is_empty()) {
            self.access_key = Some(SecretString::from(key));
        }
        if let Some(key) = lookup(SECRET_ACCESS_KEY_ENV).filter(|k| !k.is_empty()) {
            self.secret_access_key = Some(SecretString::from(key));
        }
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
