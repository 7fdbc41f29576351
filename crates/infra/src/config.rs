//! Runtime configuration.
//!
//! | variable | default |
//! |---|---|
//! | `STOCKROOM_LOCK_TIMEOUT_MS` | `5000` |
//! | `STOCKROOM_PAGE_SIZE` | `50` |
//! | `STOCKROOM_MAX_PAGE_SIZE` | `1000` |
//! | `STOCKROOM_RETRY_ATTEMPTS` | `3` |
//! | `DATABASE_URL` | unset (in-memory store) |

use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;
use crate::store::{Pagination, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

pub const LOCK_TIMEOUT_VAR: &str = "STOCKROOM_LOCK_TIMEOUT_MS";
pub const PAGE_SIZE_VAR: &str = "STOCKROOM_PAGE_SIZE";
pub const MAX_PAGE_SIZE_VAR: &str = "STOCKROOM_MAX_PAGE_SIZE";
pub const RETRY_ATTEMPTS_VAR: &str = "STOCKROOM_RETRY_ATTEMPTS";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryConfig {
    /// Upper bound on acquiring the key locks of one unit of work.
    pub lock_timeout: Duration,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub database_url: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            database_url: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl InventoryConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ms) = parse::<u64>(&lookup, LOCK_TIMEOUT_VAR)? {
            if ms == 0 {
                return Err(invalid(LOCK_TIMEOUT_VAR, "must be greater than zero"));
            }
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(max) = parse::<u32>(&lookup, MAX_PAGE_SIZE_VAR)? {
            config.max_page_size = max;
        }
        if let Some(size) = parse::<u32>(&lookup, PAGE_SIZE_VAR)? {
            config.default_page_size = size;
        }
        if config.default_page_size == 0 || config.default_page_size > config.max_page_size {
            return Err(invalid(
                PAGE_SIZE_VAR,
                format!("must be between 1 and {}", config.max_page_size),
            ));
        }
        if let Some(attempts) = parse::<u32>(&lookup, RETRY_ATTEMPTS_VAR)? {
            config.retry.max_attempts = attempts;
        }
        config.database_url = lookup(DATABASE_URL_VAR).filter(|url| !url.trim().is_empty());

        Ok(config)
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Resolve optional paging input against the configured sizes.
    pub fn page(&self, limit: Option<u32>, offset: Option<u32>) -> Pagination {
        Pagination {
            limit: limit.unwrap_or(self.default_page_size),
            offset: offset.unwrap_or(0),
        }
        .clamped(self.max_page_size)
    }
}

fn invalid(var: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        message: message.into(),
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(var, format!("{raw:?}: {e}"))),
    }
}
