//! MirroredBatch: one primary batch paired with one cache pipeline

use std::sync::Arc;

use toonkv::{Batch, KeyValueWriter};
use tracing::{debug, warn};

use crate::cache::CachePipeline;
use crate::error::{Error, Result};
use crate::stats::MirrorStats;

/// Batch whose operations are queued into both a primary batch and a cache
/// pipeline, and committed cache first
///
/// Nothing leaves the process until [`MirroredBatch::write`]. A batch is
/// meant for a single owner; it is `Send` but offers no internal locking.
pub struct MirroredBatch<B, P> {
    batch: B,
    pipeline: P,
    stats: Arc<MirrorStats>,
}

impl<B, P> MirroredBatch<B, P>
where
    B: Batch,
    P: CachePipeline,
{
    pub(crate) fn new(batch: B, pipeline: P, stats: Arc<MirrorStats>) -> Self {
        Self {
            batch,
            pipeline,
            stats,
        }
    }

    /// Queue a put on both sides. On error neither side keeps the entry.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let mark = self.pipeline.len();
        self.pipeline.set(key, value)?;

        if let Err(e) = self.batch.put(key, value) {
            self.pipeline.truncate(mark);
            return Err(Error::Store(e));
        }
        Ok(())
    }

    /// Queue a delete on both sides. On error neither side keeps the entry.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let mark = self.pipeline.len();
        self.pipeline.delete(key)?;

        if let Err(e) = self.batch.delete(key) {
            self.pipeline.truncate(mark);
            return Err(Error::Store(e));
        }
        Ok(())
    }

    /// Size of queued keys and values, as counted by the primary batch
    pub fn value_size(&self) -> usize {
        self.batch.value_size()
    }

    /// Number of queued operations
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Commit the cache pipeline, then the primary batch.
    ///
    /// On success both queues are emptied and the batch can be reused.
    /// If the pipeline fails the primary batch is not applied and both queues
    /// are kept, so the call can be retried as-is. If the primary fails after
    /// the pipeline succeeded, the cache already holds the batch and only the
    /// primary side stays queued.
    pub fn write(&mut self) -> Result<()> {
        let ops = self.batch.len();
        let bytes = self.batch.value_size();

        if let Err(e) = self.pipeline.exec() {
            self.stats.record_cache_failure();
            warn!(ops, error = %e, "cache pipeline failed, primary batch not written");
            return Err(Error::Cache(e));
        }

        if let Err(e) = self.batch.write() {
            self.stats.record_primary_failure();
            warn!(ops, error = %e, "primary batch failed after cache pipeline");
            return Err(Error::Store(e));
        }

        // The pipeline drained itself on exec
        self.batch.reset();

        self.stats.record_batch();
        debug!(ops, bytes, "mirrored batch written");
        Ok(())
    }

    /// Drop everything queued on both sides
    pub fn reset(&mut self) {
        self.pipeline.discard();
        self.batch.reset();
    }

    /// Replay the primary batch against `writer`. The cache is not involved.
    pub fn replay(&self, writer: &dyn KeyValueWriter) -> Result<()> {
        Ok(self.batch.replay(writer)?)
    }
}

impl<B, P> std::fmt::Debug for MirroredBatch<B, P>
where
    B: Batch,
    P: CachePipeline,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirroredBatch")
            .field("ops", &self.batch.len())
            .field("value_size", &self.batch.value_size())
            .field("pipelined", &self.pipeline.len())
            .finish()
    }
}
