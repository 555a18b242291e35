//! MirroredStore: forwards every mutation to a cache before the primary

use std::sync::Arc;

use toonkv::{
    Batcher, Compacter, Entries, Iteratee, KeyValueReader, KeyValueStore, KeyValueWriter, Stater,
    StoreStats,
};
use tracing::{debug, warn};

use crate::batch::MirroredBatch;
use crate::cache::CacheStore;
use crate::error::{Error, Result};
use crate::stats::MirrorStats;

/// Primary store whose writes are mirrored into a cache store
///
/// Mutations go to the cache first. If the cache fails the primary is left
/// alone and the cache error is returned. If the primary then fails, its
/// error is returned and the cache keeps the new value until a later write
/// repairs it.
///
/// Reads never consult the cache.
pub struct MirroredStore<S, C> {
    /// System of record
    store: Arc<S>,

    /// Write-only mirror
    cache: C,

    stats: Arc<MirrorStats>,
}

impl<S, C> MirroredStore<S, C>
where
    S: KeyValueStore,
    C: CacheStore,
{
    /// Wrap `store`, mirroring its writes into `cache`
    pub fn new(store: Arc<S>, cache: C) -> Self {
        Self {
            store,
            cache,
            stats: Arc::new(MirrorStats::new()),
        }
    }

    /// Set `key` in the cache, then in the primary
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if let Err(e) = self.cache.set(key, value) {
            self.stats.record_cache_failure();
            warn!(key = %String::from_utf8_lossy(key), error = %e, "cache set failed, primary not written");
            return Err(Error::Cache(e));
        }

        if let Err(e) = self.store.put(key, value) {
            self.stats.record_primary_failure();
            warn!(key = %String::from_utf8_lossy(key), error = %e, "primary put failed after cache set");
            return Err(Error::Store(e));
        }

        self.stats.record_put();
        debug!(key = %String::from_utf8_lossy(key), bytes = value.len(), "mirrored put");
        Ok(())
    }

    /// Delete `key` from the cache, then from the primary
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if let Err(e) = self.cache.delete(key) {
            self.stats.record_cache_failure();
            warn!(key = %String::from_utf8_lossy(key), error = %e, "cache delete failed, primary not written");
            return Err(Error::Cache(e));
        }

        if let Err(e) = self.store.delete(key) {
            self.stats.record_primary_failure();
            warn!(key = %String::from_utf8_lossy(key), error = %e, "primary delete failed after cache delete");
            return Err(Error::Store(e));
        }

        self.stats.record_delete();
        debug!(key = %String::from_utf8_lossy(key), "mirrored delete");
        Ok(())
    }

    /// Read `key` from the primary
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        Ok(self.store.get(key)?)
    }

    /// Check `key` in the primary
    pub fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.store.has(key)?)
    }

    /// Iterate the primary's keys under `prefix`, from `prefix ++ start`
    pub fn iter(&self, prefix: &[u8], start: &[u8]) -> Result<Entries> {
        Ok(self.store.iter(prefix, start)?)
    }

    /// Compact the primary
    pub fn compact(&self) -> Result<()> {
        Ok(self.store.compact()?)
    }

    /// Usage figures of the primary
    pub fn stat(&self) -> Result<StoreStats> {
        Ok(self.store.stat()?)
    }

    /// Start a mirrored batch
    pub fn new_batch(&self) -> MirroredBatch<S::Batch, C::Pipeline> {
        MirroredBatch::new(
            self.store.new_batch(),
            self.cache.pipeline(),
            Arc::clone(&self.stats),
        )
    }

    /// Start a mirrored batch with room for roughly `size` bytes
    pub fn new_batch_with_size(&self, size: usize) -> MirroredBatch<S::Batch, C::Pipeline> {
        MirroredBatch::new(
            self.store.new_batch_with_size(size),
            self.cache.pipeline(),
            Arc::clone(&self.stats),
        )
    }

    /// The wrapped primary store
    pub fn primary(&self) -> &Arc<S> {
        &self.store
    }

    /// The cache receiving mirrored writes
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Counters for this store and its batches
    pub fn stats(&self) -> &MirrorStats {
        &self.stats
    }
}
