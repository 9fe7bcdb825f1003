//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines the
//! session constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Longest flood wait (seconds) that is slept through before a single retry.
pub const DEFAULT_FLOOD_SLEEP_THRESHOLD_SECS: u64 = 300;

/// Default location of the session file.
pub const DEFAULT_SESSION_PATH: &str = "session/oxide.session";

/// Application settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Path of the `SQLite` session file
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,

    /// Longest flood wait, in seconds, absorbed by the invocation guard
    #[serde(default = "default_flood_sleep_threshold")]
    pub flood_sleep_threshold: u64,

    /// Application id issued by the service
    pub api_id: Option<i32>,
    /// Application hash issued by the service
    pub api_hash: Option<String>,
}

fn default_session_path() -> PathBuf {
    PathBuf::from(DEFAULT_SESSION_PATH)
}

const fn default_flood_sleep_threshold() -> u64 {
    DEFAULT_FLOOD_SLEEP_THRESHOLD_SECS
}

/// Builds the layered configuration source.
///
/// Order (later wins): `config/default`, `config/{RUN_MODE}`, `config/local`,
/// `APP__`-prefixed environment, plain environment.
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be read.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // This file shouldn't be checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // ignore_empty treats empty env vars as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use oxide_session::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Whether both application credentials are configured
    #[must_use]
    pub fn has_api_credentials(&self) -> bool {
        self.api_id.is_some() && self.api_hash.as_deref().is_some_and(|h| !h.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply() -> Result<(), ConfigError> {
        let settings: Settings = Config::builder().build()?.try_deserialize()?;
        assert_eq!(settings.session_path, PathBuf::from(DEFAULT_SESSION_PATH));
        assert_eq!(settings.flood_sleep_threshold, 300);
        assert!(!settings.has_api_credentials());
        Ok(())
    }

    #[test]
    fn test_overrides_are_parsed() -> Result<(), ConfigError> {
        let settings: Settings = Config::builder()
            .set_override("session_path", "/tmp/alt.session")?
            .set_override("flood_sleep_threshold", "60")?
            .set_override("api_id", "12345")?
            .set_override("api_hash", "0123456789abcdef")?
            .build()?
            .try_deserialize()?;
        assert_eq!(settings.session_path, PathBuf::from("/tmp/alt.session"));
        assert_eq!(settings.flood_sleep_threshold, 60);
        assert!(settings.has_api_credentials());
        Ok(())
    }

    #[test]
    fn test_blank_api_hash_is_not_a_credential() -> Result<(), ConfigError> {
        let settings: Settings = Config::builder()
            .set_override("api_id", "12345")?
            .set_override("api_hash", "")?
            .build()?
            .try_deserialize()?;
        assert!(!settings.has_api_credentials());
        Ok(())
    }
}
