//! Capability traits for key-value stores
//!
//! These are the seams other layers build on: a store is anything that can
//! read, write, iterate, batch, compact and report stats. Keys and values are
//! opaque bytes.

use crate::error::Result;

/// Read access to a key-value store
pub trait KeyValueReader {
    /// Check whether a key is present
    fn has(&self, key: &[u8]) -> Result<bool>;

    /// Get the value of a key, `Error::NotFound` if absent
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;
}

/// Write access to a key-value store
pub trait KeyValueWriter {
    /// Insert or overwrite a key
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove a key. Removing a missing key succeeds.
    fn delete(&self, key: &[u8]) -> Result<()>;
}

/// Ordered iteration over a snapshot of the store
pub trait Iteratee {
    /// Iterate over keys starting with `prefix`, from `prefix ++ start`
    /// onwards, in ascending key order.
    fn iter(&self, prefix: &[u8], start: &[u8]) -> Result<Entries>;
}

/// Write-only buffer of mutations applied together on [`Batch::write`]
pub trait Batch: Send {
    /// Queue a put. On error the batch is unchanged.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Queue a delete. On error the batch is unchanged.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Bytes of keys and values queued so far
    fn value_size(&self) -> usize;

    /// Number of queued operations
    fn len(&self) -> usize;

    /// Whether nothing is queued
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply every queued operation. The queue is kept; call
    /// [`Batch::reset`] before reusing the batch.
    fn write(&mut self) -> Result<()>;

    /// Drop every queued operation
    fn reset(&mut self);

    /// Replay the queued operations, in order, against `writer`
    fn replay(&self, writer: &dyn KeyValueWriter) -> Result<()>;
}

/// Construction of batches bound to a store
pub trait Batcher {
    /// Batch type produced by this store
    type Batch: Batch;

    /// Create an empty batch
    fn new_batch(&self) -> Self::Batch;

    /// Create an empty batch with room for roughly `size` bytes
    fn new_batch_with_size(&self, size: usize) -> Self::Batch;
}

/// Space reclamation
pub trait Compacter {
    /// Drop overwritten and deleted entries from backing storage
    fn compact(&self) -> Result<()>;
}

/// Store statistics
pub trait Stater {
    /// Report current usage
    fn stat(&self) -> Result<StoreStats>;
}

/// Usage figures reported by [`Stater::stat`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Live keys
    pub keys: usize,
    /// Total bytes of backing storage
    pub log_bytes: u64,
    /// Bytes of backing storage still referenced by live keys
    pub live_bytes: u64,
}

/// Everything a primary store has to offer
pub trait KeyValueStore:
    KeyValueReader + KeyValueWriter + Iteratee + Batcher + Compacter + Stater + Send + Sync
{
}

impl<T> KeyValueStore for T where
    T: KeyValueReader + KeyValueWriter + Iteratee + Batcher + Compacter + Stater + Send + Sync
{
}

/// Owned snapshot of (key, value) pairs returned by [`Iteratee::iter`]
#[derive(Debug, Default)]
pub struct Entries {
    inner: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
}

impl Entries {
    /// Wrap already ordered pairs
    pub fn new(pairs: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self {
            inner: pairs.into_iter(),
        }
    }
}

impl Iterator for Entries {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Entries {}
