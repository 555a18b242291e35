//! Write batches for ToonStore
//!
//! A batch keeps its operations already encoded in log format, so writing it
//! is a single append and replaying it is a walk over the same records.

use crate::error::{Error, Result};
use crate::kv::{Batch, KeyValueWriter};
use crate::parser::{encode_record, parse_record, RecordKind};
use crate::storage::{check_entry, check_key, ToonStore};

/// Batch of puts and deletes bound to a [`ToonStore`]
pub struct ToonBatch {
    store: ToonStore,
    records: Vec<u8>,
    count: usize,
    size: usize,
}

impl ToonBatch {
    pub(crate) fn new(store: ToonStore, capacity: usize) -> Self {
        Self {
            store,
            records: Vec::with_capacity(capacity),
            count: 0,
            size: 0,
        }
    }
}

impl Batch for ToonBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        check_entry(key, value)?;

        encode_record(&mut self.records, RecordKind::Put, key, value);
        self.count += 1;
        self.size += key.len() + value.len();
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        check_key(key)?;

        encode_record(&mut self.records, RecordKind::Delete, key, &[]);
        self.count += 1;
        self.size += key.len();
        Ok(())
    }

    fn value_size(&self) -> usize {
        self.size
    }

    fn len(&self) -> usize {
        self.count
    }

    fn write(&mut self) -> Result<()> {
        self.store.append(&self.records)
    }

    fn reset(&mut self) {
        self.records.clear();
        self.count = 0;
        self.size = 0;
    }

    fn replay(&self, writer: &dyn KeyValueWriter) -> Result<()> {
        let mut rest = self.records.as_slice();
        while !rest.is_empty() {
            let (remaining, record) =
                parse_record(rest).map_err(|e| Error::Parse(format!("batch replay: {:?}", e)))?;
            match record.kind {
                RecordKind::Put => writer.put(record.key, record.value)?,
                RecordKind::Delete => writer.delete(record.key)?,
            }
            rest = remaining;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ToonBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToonBatch")
            .field("ops", &self.count)
            .field("value_size", &self.size)
            .field("encoded_bytes", &self.records.len())
            .finish()
    }
}
