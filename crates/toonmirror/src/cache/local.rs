//! In-process cache store with LRU eviction
//!
//! Stands in for a network cache where one is not available. Eviction means
//! it can lose entries the primary still holds, just like a real cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{CacheOp, CachePipeline, CacheStore};
use crate::error::CacheResult;
use crate::lru::LruCache;

struct Shared {
    entries: Mutex<LruCache<Vec<u8>, Vec<u8>>>,
    evictions: AtomicU64,
}

/// Bounded in-memory cache store
#[derive(Clone)]
pub struct LocalCache {
    shared: Arc<Shared>,
}

impl LocalCache {
    /// Create a cache holding at most `capacity` keys
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(LruCache::new(capacity)),
                evictions: AtomicU64::new(0),
            }),
        }
    }

    /// Read a key, marking it recently used
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.shared.entries.lock().get(key).cloned()
    }

    /// Read a key without changing its eviction order
    pub fn peek(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.shared.entries.lock().peek(key).cloned()
    }

    /// Check for a key
    pub fn contains(&self, key: &[u8]) -> bool {
        self.shared.entries.lock().contains(key)
    }

    /// Number of cached keys
    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.shared.entries.lock().is_empty()
    }

    /// Maximum number of keys
    pub fn capacity(&self) -> usize {
        self.shared.entries.lock().capacity()
    }

    /// Keys dropped to make room
    pub fn evictions(&self) -> u64 {
        self.shared.evictions.load(Ordering::Relaxed)
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.shared.entries.lock().clear();
    }

    fn apply(&self, entries: &mut LruCache<Vec<u8>, Vec<u8>>, op: CacheOp) {
        match op {
            CacheOp::Set(key, value) => {
                if entries.put(key, value).is_some() {
                    self.shared.evictions.fetch_add(1, Ordering::Relaxed);
                }
            }
            CacheOp::Delete(key) => {
                entries.remove(key.as_slice());
            }
        }
    }
}

impl CacheStore for LocalCache {
    type Pipeline = LocalPipeline;

    fn set(&self, key: &[u8], value: &[u8]) -> CacheResult<()> {
        let mut entries = self.shared.entries.lock();
        self.apply(&mut entries, CacheOp::Set(key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> CacheResult<()> {
        self.shared.entries.lock().remove(key);
        Ok(())
    }

    fn pipeline(&self) -> LocalPipeline {
        LocalPipeline {
            cache: self.clone(),
            queued: Vec::new(),
        }
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.shared.entries.lock();
        f.debug_struct("LocalCache")
            .field("len", &entries.len())
            .field("capacity", &entries.capacity())
            .finish()
    }
}

/// Queued commands for one [`LocalCache`], applied under a single lock
#[derive(Debug)]
pub struct LocalPipeline {
    cache: LocalCache,
    queued: Vec<CacheOp>,
}

impl CachePipeline for LocalPipeline {
    fn set(&mut self, key: &[u8], value: &[u8]) -> CacheResult<()> {
        self.queued.push(CacheOp::Set(key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> CacheResult<()> {
        self.queued.push(CacheOp::Delete(key.to_vec()));
        Ok(())
    }

    fn len(&self) -> usize {
        self.queued.len()
    }

    fn truncate(&mut self, len: usize) {
        self.queued.truncate(len);
    }

    fn exec(&mut self) -> CacheResult<()> {
        if self.queued.is_empty() {
            return Ok(());
        }

        let mut entries = self.cache.shared.entries.lock();
        for op in self.queued.drain(..) {
            self.cache.apply(&mut entries, op);
        }
        Ok(())
    }

    fn discard(&mut self) {
        self.queued.clear();
    }
}
