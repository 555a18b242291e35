//! # toonmirror
//!
//! Keeps a network cache in step with a primary key-value store by
//! mirroring every write into it.
//!
//! ## Ordering
//! - Single writes: cache first, then primary. A cache failure aborts before
//!   the primary is touched.
//! - Batches: queued client-side on both sides; on `write` the cache pipeline
//!   runs as one atomic exchange, then the primary batch is applied.
//! - Reads go to the primary only.
//!
//! This is best-effort mirroring, not a distributed transaction: a primary
//! failure after a cache success leaves the cache ahead of the primary until
//! a later write to the same key.
//!
//! ```no_run
//! use std::sync::Arc;
//! use toonkv::ToonStore;
//! use toonmirror::{CacheConfig, MirroredStore, RedisCache};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(ToonStore::open("./data")?);
//! let cache = RedisCache::open(CacheConfig::new("redis://127.0.0.1:6379"))?;
//! let db = MirroredStore::new(store, cache);
//!
//! db.put(b"user:1", b"alice")?;
//!
//! let mut batch = db.new_batch();
//! batch.put(b"user:2", b"bob")?;
//! batch.delete(b"user:1")?;
//! batch.write()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod batch;
pub mod cache;
mod config;
mod error;
mod lru;
mod stats;
mod store;

#[cfg(test)]
mod testutil;

pub use batch::MirroredBatch;
pub use cache::{CachePipeline, CacheStore, LocalCache, LocalPipeline, RedisCache, RedisPipeline};
pub use config::{
    CacheConfig, ENV_CACHE_URL, ENV_CONNECT_TIMEOUT_MS, ENV_IO_TIMEOUT_MS, ENV_MAX_CONNECTIONS,
};
pub use error::{CacheError, CacheResult, Error, Result};
pub use stats::{MirrorStats, StatsSnapshot};
pub use store::MirroredStore;
