//! Client-side result cache
//!
//! Maps a normalized query key to the first page previously fetched for it. Each entry remembers
//! the page size and ordering it was fetched with and only answers lookups asking for the same
//! shape. Entries expire after a fixed TTL and the store is bounded: once it grows past `max_size`
//! the least-recently-stored entries are dropped.

use crate::types::{CacheKey, PageShape, SearchResultPage};
use lru::LruCache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a stored page stays fresh
    pub ttl: Duration,
    /// Maximum number of entries kept after a write
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            max_size: 100,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    page: SearchResultPage,
    shape: PageShape,
    stored_at: Instant,
}

/// Bounded, time-expiring store of first result pages
pub struct SearchCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    config: CacheConfig,
    stats: CacheStats,
}

impl SearchCache {
    /// Create a cache with default TTL and size
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            // Capacity is enforced by `set` so expired entries go before live ones
            entries: Mutex::new(LruCache::unbounded()),
            config,
            stats: CacheStats::default(),
        }
    }

    /// Get a copy of the page stored under `key`, if it is still fresh and was fetched with `shape`.
    ///
    /// A stale entry is removed on the way out. A fresh entry of another shape is a miss but stays
    /// stored. Reads never change eviction order.
    pub async fn get(&self, key: &CacheKey, shape: PageShape) -> Option<SearchResultPage> {
        let mut entries = self.entries.lock().await;

        let fresh = match entries.peek(key) {
            Some(entry) if entry.stored_at.elapsed() <= self.config.ttl => {
                if entry.shape == shape {
                    Some(entry.page.clone())
                } else {
                    debug!("Cached page for {} has shape {:?}, wanted {:?}", key, entry.shape, shape);
                    None
                }
            }
            Some(_) => {
                entries.pop(key);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("Cache entry expired for {}", key);
                None
            }
            None => None,
        };

        match fresh {
            Some(page) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(page)
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Like [`get`](Self::get) but leaves the counters and the stored entries untouched
    pub async fn peek(&self, key: &CacheKey, shape: PageShape) -> Option<SearchResultPage> {
        let entries = self.entries.lock().await;

        entries
            .peek(key)
            .filter(|entry| entry.shape == shape && entry.stored_at.elapsed() <= self.config.ttl)
            .map(|entry| entry.page.clone())
    }

    /// Store `page`, fetched with `shape`, under `key`, then drop expired entries and trim to
    /// `max_size`
    pub async fn set(&self, key: CacheKey, shape: PageShape, page: SearchResultPage) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        entries.put(
            key,
            CacheEntry {
                page,
                shape,
                stored_at: now,
            },
        );
        self.stats.insertions.fetch_add(1, Ordering::Relaxed);

        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.stored_at) > self.config.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }

        let mut evicted = expired.len() as u64;
        while entries.len() > self.config.max_size {
            if entries.pop_lru().is_none() {
                break;
            }
            evicted += 1;
        }

        if evicted > 0 {
            self.stats.evictions.fetch_add(evicted, Ordering::Relaxed);
            debug!("Evicted {} cache entries ({} remaining)", evicted, entries.len());
        }
    }

    /// Remove every entry
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Snapshot of the cache counters
    pub async fn stats(&self) -> CacheStatsSnapshot {
        let size = self.len().await;
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStatsSnapshot {
            hits,
            misses,
            insertions: self.stats.insertions.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            size,
            hit_rate: if lookups == 0 { 0.0 } else { hits as f64 / lookups as f64 },
        }
    }
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub size: usize,
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests;
