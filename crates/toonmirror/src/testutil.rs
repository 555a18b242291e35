//! Fault-injecting wrappers around the real backends

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempfile::TempDir;
use toonkv::{
    Batch, Batcher, Compacter, Entries, Iteratee, KeyValueReader, KeyValueWriter, Stater,
    StoreStats, ToonBatch, ToonStore,
};

use crate::cache::{CachePipeline, CacheStore, LocalCache};
use crate::error::{CacheError, CacheResult};
use crate::MirroredStore;

/// Shared on/off failure flag
#[derive(Clone, Default)]
pub struct Switch(Arc<AtomicBool>);

impl Switch {
    pub fn trip(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn injected_io() -> toonkv::Error {
    toonkv::Error::Io(io::Error::new(io::ErrorKind::Other, "injected primary failure"))
}

fn injected_cache() -> CacheError {
    CacheError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "injected cache failure",
    )))
}

/// Cache whose commands fail while `down` is tripped and whose pipelines
/// refuse to queue while `reject` is tripped
pub struct FlakyCache<C> {
    inner: C,
    down: Switch,
    reject: Switch,
}

impl<C: CacheStore> CacheStore for FlakyCache<C> {
    type Pipeline = FlakyPipeline<C::Pipeline>;

    fn set(&self, key: &[u8], value: &[u8]) -> CacheResult<()> {
        if self.down.is_tripped() {
            return Err(injected_cache());
        }
        self.inner.set(key, value)
    }

    fn delete(&self, key: &[u8]) -> CacheResult<()> {
        if self.down.is_tripped() {
            return Err(injected_cache());
        }
        self.inner.delete(key)
    }

    fn pipeline(&self) -> Self::Pipeline {
        FlakyPipeline {
            inner: self.inner.pipeline(),
            down: self.down.clone(),
            reject: self.reject.clone(),
        }
    }
}

pub struct FlakyPipeline<P> {
    inner: P,
    down: Switch,
    reject: Switch,
}

impl<P: CachePipeline> CachePipeline for FlakyPipeline<P> {
    fn set(&mut self, key: &[u8], value: &[u8]) -> CacheResult<()> {
        if self.reject.is_tripped() {
            return Err(CacheError::Rejected("injected".to_string()));
        }
        self.inner.set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> CacheResult<()> {
        if self.reject.is_tripped() {
            return Err(CacheError::Rejected("injected".to_string()));
        }
        self.inner.delete(key)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn truncate(&mut self, len: usize) {
        self.inner.truncate(len)
    }

    fn exec(&mut self) -> CacheResult<()> {
        if self.down.is_tripped() {
            return Err(injected_cache());
        }
        self.inner.exec()
    }

    fn discard(&mut self) {
        self.inner.discard()
    }
}

/// Primary store whose writes fail while `down` is tripped
pub struct FlakyStore {
    inner: ToonStore,
    down: Switch,
}

impl KeyValueReader for FlakyStore {
    fn has(&self, key: &[u8]) -> toonkv::Result<bool> {
        self.inner.has(key)
    }

    fn get(&self, key: &[u8]) -> toonkv::Result<Vec<u8>> {
        self.inner.get(key)
    }
}

impl KeyValueWriter for FlakyStore {
    fn put(&self, key: &[u8], value: &[u8]) -> toonkv::Result<()> {
        if self.down.is_tripped() {
            return Err(injected_io());
        }
        self.inner.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> toonkv::Result<()> {
        if self.down.is_tripped() {
            return Err(injected_io());
        }
        self.inner.delete(key)
    }
}

impl Iteratee for FlakyStore {
    fn iter(&self, prefix: &[u8], start: &[u8]) -> toonkv::Result<Entries> {
        self.inner.iter(prefix, start)
    }
}

impl Batcher for FlakyStore {
    type Batch = FlakyBatch;

    fn new_batch(&self) -> FlakyBatch {
        FlakyBatch {
            inner: self.inner.new_batch(),
            down: self.down.clone(),
        }
    }

    fn new_batch_with_size(&self, size: usize) -> FlakyBatch {
        FlakyBatch {
            inner: self.inner.new_batch_with_size(size),
            down: self.down.clone(),
        }
    }
}

impl Compacter for FlakyStore {
    fn compact(&self) -> toonkv::Result<()> {
        self.inner.compact()
    }
}

impl Stater for FlakyStore {
    fn stat(&self) -> toonkv::Result<StoreStats> {
        self.inner.stat()
    }
}

pub struct FlakyBatch {
    inner: ToonBatch,
    down: Switch,
}

impl Batch for FlakyBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) -> toonkv::Result<()> {
        self.inner.put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> toonkv::Result<()> {
        self.inner.delete(key)
    }

    fn value_size(&self) -> usize {
        self.inner.value_size()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn write(&mut self) -> toonkv::Result<()> {
        if self.down.is_tripped() {
            return Err(injected_io());
        }
        self.inner.write()
    }

    fn reset(&mut self) {
        self.inner.reset()
    }

    fn replay(&self, writer: &dyn KeyValueWriter) -> toonkv::Result<()> {
        self.inner.replay(writer)
    }
}

/// A mirrored store over a temp-dir ToonStore and a LocalCache, with
/// handles to inspect both sides and switches to break them
pub struct Harness {
    pub mirror: MirroredStore<FlakyStore, FlakyCache<LocalCache>>,
    pub primary: ToonStore,
    pub cache: LocalCache,
    pub cache_switch: Switch,
    pub queue_switch: Switch,
    pub store_switch: Switch,
    _dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let primary = ToonStore::open(dir.path()).unwrap();
        let cache = LocalCache::new(1024);

        let cache_switch = Switch::default();
        let queue_switch = Switch::default();
        let store_switch = Switch::default();

        let mirror = MirroredStore::new(
            Arc::new(FlakyStore {
                inner: primary.clone(),
                down: store_switch.clone(),
            }),
            FlakyCache {
                inner: cache.clone(),
                down: cache_switch.clone(),
                reject: queue_switch.clone(),
            },
        );

        Self {
            mirror,
            primary,
            cache,
            cache_switch,
            queue_switch,
            store_switch,
            _dir: dir,
        }
    }
}
