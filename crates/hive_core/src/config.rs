//! Core runtime configuration.
//!
//! # Responsibility
//! - Describe storage, logging, retry and visibility settings in one place.
//! - Load settings from TOML and overlay `HIVE_*` environment variables.
//!
//! # Invariants
//! - Unknown TOML keys are rejected instead of silently ignored.
//! - A validated config always has a non-zero busy timeout.

use crate::logging::default_log_level;
use crate::scope::UnscopedPolicy;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_DATABASE_PATH: &str = "HIVE_DATABASE_PATH";
pub const ENV_LOG_LEVEL: &str = "HIVE_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "HIVE_LOG_DIR";
pub const ENV_BUSY_TIMEOUT_MS: &str = "HIVE_BUSY_TIMEOUT_MS";
pub const ENV_BUSY_RETRY_ATTEMPTS: &str = "HIVE_BUSY_RETRY_ATTEMPTS";
pub const ENV_UNSCOPED_POLICY: &str = "HIVE_UNSCOPED_POLICY";

const DEFAULT_DATABASE_FILE: &str = "hive.sqlite3";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_BUSY_RETRY_ATTEMPTS: u32 = 5;
const MAX_BUSY_RETRY_ATTEMPTS: u32 = 10;

/// Errors raised while loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config file is not valid TOML or has unknown/mistyped keys.
    Parse(toml::de::Error),
    /// A value is syntactically valid but outside the accepted range.
    InvalidValue { key: &'static str, message: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
            Self::InvalidValue { key, message } => write!(f, "invalid `{key}`: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

/// Settings shared by every entry point that opens the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// SQLite database file.
    pub database_path: PathBuf,
    /// One of `trace|debug|info|warn|error`.
    pub log_level: String,
    /// Absolute directory for rolling log files. `None` disables file logs.
    pub log_dir: Option<PathBuf>,
    /// SQLite `busy_timeout` applied to every connection.
    pub busy_timeout_ms: u64,
    /// Extra attempts for presence transitions that hit `SQLITE_BUSY`.
    pub busy_retry_attempts: u32,
    /// Visibility of resources with no zone in their ownership closure.
    pub unscoped_policy: UnscopedPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
            log_level: default_log_level().to_string(),
            log_dir: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            busy_retry_attempts: DEFAULT_BUSY_RETRY_ATTEMPTS,
            unscoped_policy: UnscopedPolicy::default(),
        }
    }
}

impl CoreConfig {
    /// Parses a TOML document. Missing keys fall back to defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Overlays `HIVE_*` process environment variables.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlays values returned by `lookup` for each `HIVE_*` key.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_DATABASE_PATH) {
            self.database_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.log_level = value;
        }
        if let Some(value) = lookup(ENV_LOG_DIR) {
            let trimmed = value.trim();
            self.log_dir = (!trimmed.is_empty()).then(|| PathBuf::from(trimmed));
        }
        if let Some(value) = lookup(ENV_BUSY_TIMEOUT_MS) {
            self.busy_timeout_ms = parse_env(ENV_BUSY_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_BUSY_RETRY_ATTEMPTS) {
            self.busy_retry_attempts = parse_env(ENV_BUSY_RETRY_ATTEMPTS, &value)?;
        }
        if let Some(value) = lookup(ENV_UNSCOPED_POLICY) {
            self.unscoped_policy = parse_env(ENV_UNSCOPED_POLICY, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks cross-field and range constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "database_path",
                message: "must not be empty".to_string(),
            });
        }
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "busy_timeout_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.busy_retry_attempts > MAX_BUSY_RETRY_ATTEMPTS {
            return Err(ConfigError::InvalidValue {
                key: "busy_retry_attempts",
                message: format!("must be at most {MAX_BUSY_RETRY_ATTEMPTS}"),
            });
        }
        Ok(())
    }
}

fn parse_env<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig, ENV_BUSY_TIMEOUT_MS, ENV_LOG_DIR, ENV_UNSCOPED_POLICY};
    use crate::scope::UnscopedPolicy;
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[test]
    fn empty_document_yields_defaults() {
        let config = CoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.unscoped_policy, UnscopedPolicy::Creator);
    }

    #[test]
    fn toml_overrides_selected_keys() {
        let config = CoreConfig::from_toml_str(
            r#"
            database_path = "/var/lib/hive/hive.db"
            busy_retry_attempts = 2
            unscoped_policy = "hidden"
            "#,
        )
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/hive/hive.db"));
        assert_eq!(config.busy_retry_attempts, 2);
        assert_eq!(config.unscoped_policy, UnscopedPolicy::Hidden);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = CoreConfig::from_toml_str("cors_origins = []").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_busy_timeout_is_rejected() {
        let err = CoreConfig::from_toml_str("busy_timeout_ms = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "busy_timeout_ms",
                ..
            }
        ));
    }

    #[test]
    fn env_overlay_parses_and_validates() {
        let env = HashMap::from([
            (ENV_BUSY_TIMEOUT_MS, "250"),
            (ENV_UNSCOPED_POLICY, "shared"),
            (ENV_LOG_DIR, "  "),
        ]);
        let config = CoreConfig::default()
            .apply_env_from(|key| env.get(key).map(|value| value.to_string()))
            .unwrap();
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.unscoped_policy, UnscopedPolicy::Shared);
        assert_eq!(config.log_dir, None);

        let bad = HashMap::from([(ENV_UNSCOPED_POLICY, "everyone")]);
        let err = CoreConfig::default()
            .apply_env_from(|key| bad.get(key).map(|value| value.to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_UNSCOPED_POLICY));
    }
}
