//! Catalog configuration.
//!
//! Loaded from TOML; every field has a default so an empty file (or no file)
//! yields a working setup. The library reads no environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Top-level configuration for [`crate::Catalog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// SQLite connection string, e.g. `sqlite://data/leasehold.db`
    pub database_url: String,
    pub pool: PoolConfig,
    pub retry: RetryConfig,
    pub monitor: MonitorConfig,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://leasehold.db".to_string(),
            pool: PoolConfig::default(),
            retry: RetryConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// Connection pool limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum live connections
    pub max_size: usize,
    /// Maximum callers allowed to wait for a connection
    pub queue_limit: usize,
    /// Maximum connections kept open while idle, `max_size` when unset
    pub max_idle: Option<usize>,
    pub idle_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 5,
            queue_limit: 7,
            max_idle: None,
            idle_timeout_ms: 60_000,
            acquire_timeout_ms: 10_000,
        }
    }
}

impl PoolConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Effective idle cap.
    pub fn max_idle(&self) -> usize {
        self.max_idle.unwrap_or(self.max_size)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Set the maximum number of connections in the pool.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self.max_idle = self.max_idle.map(|idle| idle.min(max_size));
        self
    }

    pub fn with_queue_limit(mut self, queue_limit: usize) -> Self {
        self.queue_limit = queue_limit;
        self
    }

    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the connection checkout timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = duration_ms(timeout);
        self
    }
}

/// Retry policy for pool exhaustion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Backoff before attempt `n + 1` is `n * base_delay`
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Background pool diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    /// Log a warning when more connections than this are checked out.
    /// Unset means warn once every connection is in use.
    pub warn_active_above: Option<usize>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 30_000,
            warn_active_above: None,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Active-connection count above which the monitor warns.
    pub fn warn_threshold(&self, max_size: usize) -> usize {
        self.warn_active_above
            .unwrap_or_else(|| max_size.saturating_sub(1))
    }
}

impl CatalogConfig {
    /// Configuration pointing at `database_url`, everything else default.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    /// Parse configuration from TOML text and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Reject limits the pool cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(Error::config("database_url must not be empty"));
        }
        if self.pool.max_size == 0 {
            return Err(Error::config("pool.max_size must be at least 1"));
        }
        if let Some(max_idle) = self.pool.max_idle {
            if max_idle > self.pool.max_size {
                return Err(Error::config(format!(
                    "pool.max_idle ({max_idle}) exceeds pool.max_size ({})",
                    self.pool.max_size
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }
        if self.monitor.enabled && self.monitor.interval_ms == 0 {
            return Err(Error::config("monitor.interval_ms must be positive"));
        }
        if let Some(threshold) = self.monitor.warn_active_above {
            if threshold >= self.pool.max_size {
                return Err(Error::config(format!(
                    "monitor.warn_active_above ({threshold}) must be below pool.max_size ({})",
                    self.pool.max_size
                )));
            }
        }
        Ok(())
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CatalogConfig::default();
        assert_eq!(config.pool.max_size, 5);
        assert_eq!(config.pool.queue_limit, 7);
        assert_eq!(config.pool.max_idle(), 5);
        assert_eq!(config.monitor.warn_threshold(config.pool.max_size), 4);
        assert_eq!(config.pool.idle_timeout(), Duration::from_secs(60));
        assert_eq!(config.pool.acquire_timeout(), Duration::from_secs(10));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay(), Duration::from_millis(100));
        assert!(!config.monitor.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = CatalogConfig::from_toml_str(
            r#"
            database_url = "sqlite://rentals.db"

            [pool]
            max_size = 2
            max_idle = 1

            [retry]
            base_delay_ms = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.database_url, "sqlite://rentals.db");
        assert_eq!(config.pool.max_size, 2);
        assert_eq!(config.pool.queue_limit, 7);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 5);
    }

    #[test]
    fn rejects_impossible_limits() {
        let err = CatalogConfig::from_toml_str("[pool]\nmax_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_size"));

        let err = CatalogConfig::from_toml_str("[pool]\nmax_size = 2\nmax_idle = 3\n").unwrap_err();
        assert!(err.to_string().contains("max_idle"));

        let err = CatalogConfig::from_toml_str("[retry]\nmax_attempts = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn builder_clamps_idle_to_size() {
        let pool = PoolConfig::default()
            .with_max_size(2)
            .with_acquire_timeout(Duration::from_millis(250));
        assert_eq!(pool.max_idle(), 2);
        assert_eq!(pool.acquire_timeout_ms, 250);
    }

    #[test]
    fn idle_cap_follows_size_when_unset() {
        let config = CatalogConfig::from_toml_str("[pool]\nmax_size = 3\n").unwrap();
        assert_eq!(config.pool.max_size, 3);
        assert_eq!(config.pool.max_idle(), 3);
    }

    #[test]
    fn warn_threshold_tracks_pool_size() {
        let config = CatalogConfig::from_toml_str("[pool]\nmax_size = 8\n").unwrap();
        assert_eq!(config.monitor.warn_threshold(config.pool.max_size), 7);

        let config =
            CatalogConfig::from_toml_str("[pool]\nmax_size = 8\n\n[monitor]\nwarn_active_above = 6\n")
                .unwrap();
        assert_eq!(config.monitor.warn_threshold(config.pool.max_size), 6);

        let err = CatalogConfig::from_toml_str("[monitor]\nwarn_active_above = 10\n").unwrap_err();
        assert!(err.to_string().contains("warn_active_above"));
    }
}
