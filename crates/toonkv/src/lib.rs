//! # toonkv
//!
//! Embedded log-structured key-value store.
//!
//! ## Design
//! - Append-only log, one record per put/delete
//! - Ordered in-memory index rebuilt from the log on open
//! - Write batches applied as a single append
//! - 64 KiB max key, 1 MiB max value, 1 GiB max log
//!
//! The capability traits in [`kv`] describe what any primary store must
//! offer; [`ToonStore`] is the implementation shipped here.

#![warn(missing_docs)]

mod batch;
mod error;
pub mod kv;
mod parser;
mod storage;

pub use batch::ToonBatch;
pub use error::{Error, Result};
pub use kv::{
    Batch, Batcher, Compacter, Entries, Iteratee, KeyValueReader, KeyValueStore, KeyValueWriter,
    Stater, StoreStats,
};
pub use storage::ToonStore;
