//! Cache configuration and its defaults

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::Duration;
use directories::BaseDirs;

use crate::cache::lock::DEFAULT_POLL_INTERVAL;
use crate::cache::resolve::DEFAULT_TTL_DAYS;

/// File name of the cache in the user's home directory
pub const CACHE_FILE_NAME: &str = ".sunmoon-cache.json";

/// How long `save` waits for the write lock by default
pub const DEFAULT_LOCK_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Settings for a [`CacheStore`](crate::cache::CacheStore)
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Backing JSON file
    pub path: PathBuf,
    /// Age after which entries are stale
    pub ttl: Duration,
    /// How long a save waits for the write lock
    pub lock_timeout: StdDuration,
    /// Sleep between lock attempts
    pub poll_interval: StdDuration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            ttl: Duration::days(DEFAULT_TTL_DAYS),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// Default settings with a custom backing file
    ///
    /// Useful for testing or when a specific cache location is needed.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn lock_timeout(mut self, timeout: StdDuration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: StdDuration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// `~/.sunmoon-cache.json`, or `./.sunmoon-cache.json` without a home directory
pub fn default_cache_path() -> PathBuf {
    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(CACHE_FILE_NAME),
        None => PathBuf::from(CACHE_FILE_NAME),
    }
}
