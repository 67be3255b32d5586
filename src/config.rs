use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::policy::{CounterPath, CounterPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_path: PathBuf,

    // Shared counter buffer; required when any counter is buffered
    pub redis_url: Option<String>,

    // Reconciliation
    pub reconcile_interval: Duration,
    pub flush_lock_timeout: Duration,

    // Counter paths
    pub counter_policy: CounterPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_path: PathBuf::from(env_or_default(
                "DATABASE_PATH",
                "./data/counters.sqlite",
            )),

            redis_url: optional_env("REDIS_URL"),

            reconcile_interval: Duration::from_secs(parse_env_u64("RECONCILE_INTERVAL_SECS", 60)?),
            flush_lock_timeout: Duration::from_secs(parse_env_u64("FLUSH_LOCK_TIMEOUT_SECS", 10)?),

            counter_policy: CounterPolicy {
                comments_count: parse_env_path("COMMENTS_COUNT_PATH", CounterPath::Buffered)?,
                reposts_count: parse_env_path("REPOSTS_COUNT_PATH", CounterPath::Buffered)?,
            },
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconcile_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "RECONCILE_INTERVAL_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.flush_lock_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "FLUSH_LOCK_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.uses_buffer() && self.redis_url.is_none() {
            return Err(ConfigError::InvalidValue {
                name: "REDIS_URL".to_string(),
                message: "required while COMMENTS_COUNT_PATH or REPOSTS_COUNT_PATH is buffered"
                    .to_string(),
            });
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "DATABASE_PATH".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Whether any counter goes through the buffer.
    #[must_use]
    pub fn uses_buffer(&self) -> bool {
        self.counter_policy.comments_count == CounterPath::Buffered
            || self.counter_policy.reposts_count == CounterPath::Buffered
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_path(name: &str, default: CounterPath) -> Result<CounterPath, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|message| ConfigError::InvalidValue {
            name: name.to_string(),
            message,
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 6] = [
        "DATABASE_PATH",
        "REDIS_URL",
        "RECONCILE_INTERVAL_SECS",
        "FLUSH_LOCK_TIMEOUT_SECS",
        "COMMENTS_COUNT_PATH",
        "REPOSTS_COUNT_PATH",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::from_env().unwrap();

        assert_eq!(config.database_path, PathBuf::from("./data/counters.sqlite"));
        assert!(config.redis_url.is_none());
        assert_eq!(config.reconcile_interval, Duration::from_secs(60));
        assert_eq!(config.flush_lock_timeout, Duration::from_secs(10));
        assert_eq!(config.counter_policy, CounterPolicy::all_buffered());
        assert!(config.uses_buffer());
    }

    #[test]
    #[serial]
    fn test_buffered_counters_require_redis() {
        clear_env();
        let config = Config::from_env().unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref name, .. }) if name == "REDIS_URL"
        ));

        std::env::set_var("REDIS_URL", "redis://127.0.0.1:6379");
        Config::from_env().unwrap().validate().unwrap();

        // Without buffered counters there is nothing to share
        std::env::remove_var("REDIS_URL");
        std::env::set_var("COMMENTS_COUNT_PATH", "direct");
        std::env::set_var("REPOSTS_COUNT_PATH", "direct");
        Config::from_env().unwrap().validate().unwrap();
        clear_env();
    }

    #[test]
    #[serial]
    fn test_counter_paths_from_env() {
        clear_env();
        std::env::set_var("COMMENTS_COUNT_PATH", "direct");
        std::env::set_var("REPOSTS_COUNT_PATH", "Direct");

        let config = Config::from_env().unwrap();
        assert_eq!(config.counter_policy, CounterPolicy::all_direct());
        assert!(!config.uses_buffer());

        std::env::set_var("REPOSTS_COUNT_PATH", "sideways");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue { ref name, .. }) if name == "REPOSTS_COUNT_PATH"
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_zero_interval_rejected() {
        clear_env();
        std::env::set_var("RECONCILE_INTERVAL_SECS", "0");
        let config = Config::from_env().unwrap();
        assert!(config.validate().is_err());

        std::env::set_var("RECONCILE_INTERVAL_SECS", "soon");
        assert!(matches!(Config::from_env(), Err(ConfigError::ParseInt { .. })));
        clear_env();
    }

    #[test]
    fn test_parse_u64_default() {
        assert_eq!(parse_env_u64("NONEXISTENT_COUNTER_SYNC_VAR", 7).unwrap(), 7);
    }
}
