//! Study configuration caching.
//!
//! Study configurations are read on every query and every write batch but
//! change rarely. [`StudyConfigurationCache`] keeps them in an LRU with a
//! time-to-live in front of a [`StudyConfigurationManager`].

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::StorageResult;
use crate::model::StudyConfiguration;
use crate::traits::StudyConfigurationManager;

#[derive(Debug, Clone)]
struct CacheEntry {
    config: Arc<StudyConfiguration>,
    created_at: Instant,
}

impl CacheEntry {
    fn new(config: Arc<StudyConfiguration>) -> Self {
        Self {
            config,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Thread-safe LRU cache with TTL over a [`StudyConfigurationManager`].
///
/// Lookups by name go through the manager once, then are served from the
/// id-keyed cache. Missing studies are not cached.
pub struct StudyConfigurationCache<'a> {
    manager: &'a dyn StudyConfigurationManager,
    inner: Option<Mutex<LruCache<i32, CacheEntry>>>,
    names: Mutex<HashMap<String, i32>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<'a> StudyConfigurationCache<'a> {
    /// Creates a cache. `None` disables caching.
    pub fn new(manager: &'a dyn StudyConfigurationManager, config: Option<&CacheConfig>) -> Self {
        let inner = config.map(|c| {
            let capacity = NonZeroUsize::new(c.max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
            Mutex::new(LruCache::new(capacity))
        });
        Self {
            manager,
            inner,
            names: Mutex::new(Default::default()),
            ttl: config.map_or(Duration::ZERO, |c| c.ttl),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Configuration of a study by id.
    pub fn get_by_id(&self, study_id: i32) -> StorageResult<Option<Arc<StudyConfiguration>>> {
        if let Some(inner) = &self.inner {
            let mut cache = inner.lock();
            if let Some(entry) = cache.get(&study_id) {
                if !entry.is_expired(self.ttl) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(Arc::clone(&entry.config)));
                }
                cache.pop(&study_id);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let loaded = self.manager.get_by_id(study_id)?.map(Arc::new);
        if let Some(config) = &loaded {
            self.store(config);
        }
        Ok(loaded)
    }

    /// Configuration of a study by name.
    pub fn get_by_name(&self, study_name: &str) -> StorageResult<Option<Arc<StudyConfiguration>>> {
        let known = self.names.lock().get(study_name).copied();
        if let Some(id) = known {
            if let Some(config) = self.get_by_id(id)? {
                if config.study_name == study_name {
                    return Ok(Some(config));
                }
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let loaded = self.manager.get_by_name(study_name)?.map(Arc::new);
        if let Some(config) = &loaded {
            self.store(config);
        }
        Ok(loaded)
    }

    /// Configuration of a study by name or numeric id.
    pub fn resolve(&self, study: &str) -> StorageResult<Option<Arc<StudyConfiguration>>> {
        match study.parse::<i32>() {
            Ok(id) => self.get_by_id(id),
            Err(_) => self.get_by_name(study),
        }
    }

    /// Configurations of every known study.
    pub fn all(&self) -> StorageResult<Vec<Arc<StudyConfiguration>>> {
        let mut out = Vec::new();
        for id in self.manager.study_ids()? {
            if let Some(config) = self.get_by_id(id)? {
                out.push(config);
            }
        }
        Ok(out)
    }

    /// Drops a study so the next lookup reloads it.
    pub fn invalidate(&self, study_id: i32) {
        if let Some(inner) = &self.inner {
            inner.lock().pop(&study_id);
        }
        self.names.lock().retain(|_, id| *id != study_id);
        debug!(study_id, "Invalidated study configuration");
    }

    /// Drops every cached study.
    pub fn clear(&self) {
        if let Some(inner) = &self.inner {
            inner.lock().clear();
        }
        self.names.lock().clear();
    }

    /// Removes expired entries.
    pub fn cleanup_expired(&self) {
        if let Some(inner) = &self.inner {
            let mut cache = inner.lock();
            let expired: Vec<i32> = cache
                .iter()
                .filter(|(_, entry)| entry.is_expired(self.ttl))
                .map(|(id, _)| *id)
                .collect();
            for id in expired {
                cache.pop(&id);
            }
        }
    }

    /// Number of cached studies, possibly including expired ones.
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.lock().len())
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        let (total, expired) = match &self.inner {
            Some(inner) => {
                let cache = inner.lock();
                let expired = cache
                    .iter()
                    .filter(|(_, entry)| entry.is_expired(self.ttl))
                    .count();
                (cache.len(), expired)
            }
            None => (0, 0),
        };
        CacheStats {
            total_entries: total,
            expired_entries: expired,
            valid_entries: total.saturating_sub(expired),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn store(&self, config: &Arc<StudyConfiguration>) {
        if let Some(inner) = &self.inner {
            inner
                .lock()
                .put(config.study_id, CacheEntry::new(Arc::clone(config)));
            self.names
                .lock()
                .insert(config.study_name.clone(), config.study_id);
        }
    }
}

impl std::fmt::Debug for StudyConfigurationCache<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("StudyConfigurationCache")
            .field("enabled", &self.inner.is_some())
            .field("entries", &stats.total_entries)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Statistics about the cache state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of entries in the cache.
    pub total_entries: usize,
    /// Number of expired entries (not yet cleaned up).
    pub expired_entries: usize,
    /// Number of valid (non-expired) entries.
    pub valid_entries: usize,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that went to the manager.
    pub misses: u64,
}
