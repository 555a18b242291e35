//! Mirroring statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by a [`MirroredStore`](crate::MirroredStore) and every
/// batch it creates
#[derive(Debug, Default)]
pub struct MirrorStats {
    puts: AtomicU64,
    deletes: AtomicU64,
    batches: AtomicU64,
    cache_failures: AtomicU64,
    primary_failures: AtomicU64,
}

/// Point-in-time copy of [`MirrorStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Puts applied to both cache and primary
    pub puts: u64,
    /// Deletes applied to both cache and primary
    pub deletes: u64,
    /// Batches committed to both cache and primary
    pub batches: u64,
    /// Operations aborted by the cache before the primary was touched
    pub cache_failures: u64,
    /// Operations where the cache was updated but the primary failed
    pub primary_failures: u64,
}

impl MirrorStats {
    /// Create a zeroed tracker
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_failure(&self) {
        self.cache_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_primary_failure(&self) {
        self.primary_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Mirrored puts
    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Mirrored deletes
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Committed batches
    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Cache-side failures
    pub fn cache_failures(&self) -> u64 {
        self.cache_failures.load(Ordering::Relaxed)
    }

    /// Primary-side failures after a successful cache update. Each one is a
    /// window where the cache may hold data the primary does not.
    pub fn primary_failures(&self) -> u64 {
        self.primary_failures.load(Ordering::Relaxed)
    }

    /// Copy all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            puts: self.puts(),
            deletes: self.deletes(),
            batches: self.batches(),
            cache_failures: self.cache_failures(),
            primary_failures: self.primary_failures(),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.puts.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.batches.store(0, Ordering::Relaxed);
        self.cache_failures.store(0, Ordering::Relaxed);
        self.primary_failures.store(0, Ordering::Relaxed);
    }
}
