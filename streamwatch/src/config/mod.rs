//! Process configuration loaded from the environment.
//!
//! | variable                              | default                          |
//! |---------------------------------------|----------------------------------|
//! | `DATABASE_URL`                        | `sqlite:streamwatch.db?mode=rwc` |
//! | `STREAMWATCH_REGISTRY_INTERVAL_SECS`  | `60`                             |
//! | `STREAMWATCH_FETCH_TIMEOUT_SECS`      | `10`                             |
//! | `STREAMWATCH_SHUTDOWN_TIMEOUT_SECS`   | `10`                             |
//! | `DISCORD_BOT_TOKEN`                   | required by the Discord sink     |
//! | `DISCORD_API_BASE`                    | `https://discord.com/api/v10`    |
//! | `STREAMWATCH_LOG_DIR`                 | unset (console only)             |

use std::path::PathBuf;
use std::time::Duration;

use crate::monitor::DEFAULT_FETCH_TIMEOUT;
use crate::notification::DEFAULT_DISCORD_API_BASE;
use crate::scheduler::{DEFAULT_REGISTRY_INTERVAL, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::{Error, Result};

/// Default SQLite database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:streamwatch.db?mode=rwc";

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Interval between host registry passes.
    pub registry_interval: Duration,
    /// Bound for one status endpoint request.
    pub fetch_timeout: Duration,
    /// Time allowed for workers to stop on shutdown.
    pub shutdown_timeout: Duration,
    pub discord_bot_token: Option<String>,
    pub discord_api_base: String,
    /// Directory for rolling log files; console only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            registry_interval: DEFAULT_REGISTRY_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            discord_bot_token: None,
            discord_api_base: DEFAULT_DISCORD_API_BASE.to_string(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Ok(Self {
            database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),
            registry_interval: parse_secs(
                "STREAMWATCH_REGISTRY_INTERVAL_SECS",
                var("STREAMWATCH_REGISTRY_INTERVAL_SECS"),
                defaults.registry_interval,
            )?,
            fetch_timeout: parse_secs(
                "STREAMWATCH_FETCH_TIMEOUT_SECS",
                var("STREAMWATCH_FETCH_TIMEOUT_SECS"),
                defaults.fetch_timeout,
            )?,
            shutdown_timeout: parse_secs(
                "STREAMWATCH_SHUTDOWN_TIMEOUT_SECS",
                var("STREAMWATCH_SHUTDOWN_TIMEOUT_SECS"),
                defaults.shutdown_timeout,
            )?,
            discord_bot_token: var("DISCORD_BOT_TOKEN"),
            discord_api_base: var("DISCORD_API_BASE").unwrap_or(defaults.discord_api_base),
            log_dir: var("STREAMWATCH_LOG_DIR").map(PathBuf::from),
        })
    }

    /// The Discord bot token, or a configuration error when missing.
    pub fn require_discord_token(&self) -> Result<&str> {
        self.discord_bot_token
            .as_deref()
            .ok_or_else(|| Error::config("DISCORD_BOT_TOKEN is not set"))
    }
}

fn parse_secs(key: &str, value: Option<String>, default: Duration) -> Result<Duration> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.parse::<u64>() {
        Ok(0) => Err(Error::config(format!("{} must be greater than zero", key))),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => Err(Error::config(format!(
            "{} must be a whole number of seconds, got '{}'",
            key, value
        ))),
    }
}
