//! Cache configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`StateCache`](crate::StateCache).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding snapshot files.
    pub cache_dir: PathBuf,
    /// Upper bound on the total size of all snapshot files.
    pub max_size_bytes: u64,
    /// Entries older than this are treated as absent.
    pub ttl_secs: u64,
    /// Interval of the background expiry sweep.
    pub cleanup_interval_secs: u64,
    /// Keep parsed states in memory after a put or load.
    pub keep_in_memory: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("terrakit-cache"),
            max_size_bytes: 1024 * 1024 * 1024,
            ttl_secs: 3600,
            cleanup_interval_secs: 900,
            keep_in_memory: true,
        }
    }
}

impl CacheConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval_secs = interval.as_secs();
        self
    }

    pub fn with_keep_in_memory(mut self, keep: bool) -> Self {
        self.keep_in_memory = keep;
        self
    }

    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs.min(i64::MAX as u64) as i64)
    }

    pub fn cleanup_interval(&self) -> Duration {
        // A zero interval would make tokio's ticker panic.
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_size_bytes, 1 << 30);
        assert_eq!(config.ttl_secs, 3600);
        assert_eq!(config.cleanup_interval(), Duration::from_secs(900));
        assert!(config.keep_in_memory);
        assert!(config.cache_dir.ends_with("terrakit-cache"));
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"cache_dir": "/var/cache/tk", "ttl_secs": 60}"#).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/tk"));
        assert_eq!(config.ttl_secs, 60);
        assert_eq!(config.max_size_bytes, 1 << 30);
    }
}
