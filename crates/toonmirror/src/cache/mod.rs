//! Cache store capability set
//!
//! A cache store takes single commands synchronously and hands out pipelines
//! that queue commands client-side and send them in one atomic exchange.

mod local;
mod remote;

pub use self::local::{LocalCache, LocalPipeline};
pub use self::remote::{RedisCache, RedisPipeline};

use crate::error::CacheResult;

/// Network-resident key-value cache
pub trait CacheStore: Send + Sync {
    /// Pipeline type handed out by [`CacheStore::pipeline`]
    type Pipeline: CachePipeline;

    /// Set a key, waiting for the backend to acknowledge
    fn set(&self, key: &[u8], value: &[u8]) -> CacheResult<()>;

    /// Delete a key, waiting for the backend to acknowledge. Deleting a
    /// missing key succeeds.
    fn delete(&self, key: &[u8]) -> CacheResult<()>;

    /// Create an empty pipeline
    fn pipeline(&self) -> Self::Pipeline;
}

/// Client-side queue of cache commands
pub trait CachePipeline: Send {
    /// Queue a set. On error the queue is unchanged.
    fn set(&mut self, key: &[u8], value: &[u8]) -> CacheResult<()>;

    /// Queue a delete. On error the queue is unchanged.
    fn delete(&mut self, key: &[u8]) -> CacheResult<()>;

    /// Number of queued commands
    fn len(&self) -> usize;

    /// Whether nothing is queued
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop queued commands past the first `len`
    fn truncate(&mut self, len: usize);

    /// Send every queued command as one atomic exchange.
    ///
    /// The queue is cleared only on success. An empty queue succeeds without
    /// any I/O.
    fn exec(&mut self) -> CacheResult<()>;

    /// Drop every queued command without sending
    fn discard(&mut self);
}

/// A queued cache command
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CacheOp {
    Set(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}
