//! Configuration types for the variant adaptor.

use std::time::Duration;

/// Configuration for [`VariantAdaptor`](crate::VariantAdaptor).
///
/// # Example
///
/// ```rust
/// use variant_storage::{CacheConfig, StorageConfig};
/// use std::time::Duration;
///
/// let config = StorageConfig::builder()
///     .with_cache(CacheConfig::default())
///     .with_batch_size(500)
///     .with_group_by_limit(20)
///     .build();
/// assert_eq!(config.batch_size, 500);
/// ```
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Study configuration cache (None = every lookup hits the manager).
    pub cache: Option<CacheConfig>,
    /// Variants converted per bulk write.
    pub batch_size: usize,
    /// Default number of groups returned by `group_by`.
    pub group_by_limit: usize,
    /// Default number of buckets `get_frequency` splits a region into.
    pub histogram_buckets: u32,
    /// Convert insert batches in parallel (requires the `parallel` feature).
    pub parallel: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache: Some(CacheConfig::default()),
            batch_size: 100,
            group_by_limit: 10,
            histogram_buckets: 200,
            parallel: false,
        }
    }
}

impl StorageConfig {
    /// Creates a new builder for StorageConfig.
    pub fn builder() -> StorageConfigBuilder {
        StorageConfigBuilder::default()
    }
}

/// Builder for StorageConfig.
#[derive(Debug, Clone, Default)]
pub struct StorageConfigBuilder {
    config: StorageConfig,
}

impl StorageConfigBuilder {
    /// Enables the study configuration cache.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.config.cache = Some(cache);
        self
    }

    /// Disables the study configuration cache.
    pub fn without_cache(mut self) -> Self {
        self.config.cache = None;
        self
    }

    /// Sets the insert batch size. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size.max(1);
        self
    }

    /// Sets the default group-by limit.
    pub fn with_group_by_limit(mut self, limit: usize) -> Self {
        self.config.group_by_limit = limit;
        self
    }

    /// Sets the default histogram bucket count. Zero is treated as one.
    pub fn with_histogram_buckets(mut self, buckets: u32) -> Self {
        self.config.histogram_buckets = buckets.max(1);
        self
    }

    /// Enables or disables parallel conversion.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    /// Builds the StorageConfig.
    pub fn build(self) -> StorageConfig {
        self.config
    }
}

/// Configuration for the study configuration cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached studies.
    pub max_entries: usize,
    /// Time-to-live for cached entries.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            ttl: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert!(config.cache.is_some());
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.group_by_limit, 10);
        assert_eq!(config.histogram_buckets, 200);
        assert!(!config.parallel);
    }

    #[test]
    fn test_builder() {
        let config = StorageConfig::builder()
            .without_cache()
            .with_batch_size(0)
            .with_parallel(true)
            .with_histogram_buckets(50)
            .build();
        assert!(config.cache.is_none());
        assert_eq!(config.batch_size, 1);
        assert!(config.parallel);
        assert_eq!(config.histogram_buckets, 50);
    }

    #[test]
    fn test_cache_config_default() {
        let cache = CacheConfig::default();
        assert_eq!(cache.max_entries, 1_000);
        assert_eq!(cache.ttl, Duration::from_secs(300));
    }
}
