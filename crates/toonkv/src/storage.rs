//! Storage engine implementation
//!
//! File layout:
//! - `db.toon`: append-only log of put/delete records
//!
//! The whole key space lives in an ordered in-memory index that maps each
//! live key to the position of its latest value in the log. The index is
//! rebuilt from the log on open.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use memmap2::Mmap;
use nom::error::ErrorKind;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::batch::ToonBatch;
use crate::error::{Error, Result};
use crate::kv::{
    Batcher, Compacter, Entries, Iteratee, KeyValueReader, KeyValueWriter, Stater, StoreStats,
};
use crate::parser::{
    create_header, encode_record, encoded_len, parse_header, parse_record, RecordKind,
    FORMAT_VERSION, HEADER_LEN, RECORD_HEADER_LEN,
};

/// Maximum key size (64 KiB)
pub(crate) const MAX_KEY_SIZE: usize = 64 * 1024;

/// Maximum value size (1 MiB)
pub(crate) const MAX_VALUE_SIZE: usize = 1024 * 1024;

/// Maximum log size (1 GiB)
const MAX_DB_SIZE: u64 = 1024 * 1024 * 1024;

const DATA_FILE: &str = "db.toon";
const COMPACT_FILE: &str = "db.toon.compact";

/// Location of a value inside the log
#[derive(Debug, Clone, Copy)]
struct ValueRef {
    offset: u64,
    len: u32,
}

type Index = BTreeMap<Vec<u8>, ValueRef>;

struct LogFile {
    file: File,
    size: u64,
}

struct Shared {
    path: PathBuf,

    /// Ordered index: key -> latest value position.
    /// Lock order: `index` before `log`.
    index: RwLock<Index>,

    log: Mutex<LogFile>,

    closed: AtomicBool,
}

/// ToonStore is the main database handle
///
/// Handles are cheap to clone and share one underlying log. Batches created
/// from a handle keep the log open until they are dropped.
#[derive(Clone)]
pub struct ToonStore {
    shared: Arc<Shared>,
}

impl ToonStore {
    /// Open or create a store in the given directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path)?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.join(DATA_FILE))?;

        if file.metadata()?.len() == 0 {
            file.write_all(&create_header(FORMAT_VERSION))?;
            file.sync_all()?;
        }

        let (index, size) = load_index(&file)?;
        debug!(path = %path.display(), keys = index.len(), bytes = size, "opened store");

        Ok(ToonStore {
            shared: Arc::new(Shared {
                path: path.to_path_buf(),
                index: RwLock::new(index),
                log: Mutex::new(LogFile { file, size }),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Directory holding the log
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.shared.index.read().len()
    }

    /// Check if the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.shared.index.read().is_empty()
    }

    /// Flush the log to disk
    pub fn sync(&self) -> Result<()> {
        self.check_open()?;
        self.shared.log.lock().file.sync_all()?;
        Ok(())
    }

    /// Close the store and fsync the log. Later calls on any handle fail
    /// with `Error::Closed`.
    pub fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.shared.log.lock().file.sync_all()?;
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Append pre-validated, encoded records and publish them to readers in
    /// one step.
    pub(crate) fn append(&self, records: &[u8]) -> Result<()> {
        self.check_open()?;
        if records.is_empty() {
            return Ok(());
        }

        let mut index = self.shared.index.write();
        let mut log = self.shared.log.lock();

        let base = log.size;
        if base + records.len() as u64 > MAX_DB_SIZE {
            return Err(Error::DatabaseFull(base));
        }

        log.file.seek(SeekFrom::Start(base))?;
        if let Err(e) = log.file.write_all(records) {
            // Drop whatever part of the write made it to disk
            let _ = log.file.set_len(base);
            return Err(e.into());
        }
        log.size = base + records.len() as u64;

        index_records(&mut index, records, base)?;
        Ok(())
    }
}

impl KeyValueReader for ToonStore {
    fn has(&self, key: &[u8]) -> Result<bool> {
        self.check_open()?;
        Ok(self.shared.index.read().contains_key(key))
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.check_open()?;

        let index = self.shared.index.read();
        let at = *index.get(key).ok_or(Error::NotFound)?;

        let mut log = self.shared.log.lock();
        read_value(&mut log.file, at)
    }
}

impl KeyValueWriter for ToonStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        check_entry(key, value)?;

        let mut record = Vec::with_capacity(encoded_len(key, value));
        encode_record(&mut record, RecordKind::Put, key, value);
        self.append(&record)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        check_key(key)?;

        let mut record = Vec::with_capacity(encoded_len(key, &[]));
        encode_record(&mut record, RecordKind::Delete, key, &[]);
        self.append(&record)
    }
}

impl Iteratee for ToonStore {
    fn iter(&self, prefix: &[u8], start: &[u8]) -> Result<Entries> {
        self.check_open()?;

        let mut from = prefix.to_vec();
        from.extend_from_slice(start);

        let index = self.shared.index.read();
        let mut log = self.shared.log.lock();

        let mut pairs = Vec::new();
        for (key, at) in index.range::<[u8], _>((Bound::Included(from.as_slice()), Bound::Unbounded)) {
            if !key.starts_with(prefix) {
                break;
            }
            pairs.push((key.clone(), read_value(&mut log.file, *at)?));
        }

        Ok(Entries::new(pairs))
    }
}

impl Batcher for ToonStore {
    type Batch = ToonBatch;

    fn new_batch(&self) -> ToonBatch {
        ToonBatch::new(self.clone(), 0)
    }

    fn new_batch_with_size(&self, size: usize) -> ToonBatch {
        ToonBatch::new(self.clone(), size)
    }
}

impl Compacter for ToonStore {
    /// Rewrite the log with only the latest value of each live key
    fn compact(&self) -> Result<()> {
        self.check_open()?;

        let mut index = self.shared.index.write();
        let mut log = self.shared.log.lock();

        let before = log.size;
        let tmp_path = self.shared.path.join(COMPACT_FILE);
        let tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut writer = BufWriter::new(tmp);
        let header = create_header(FORMAT_VERSION);
        writer.write_all(&header)?;

        let mut compacted = Index::new();
        let mut offset = header.len() as u64;
        let mut record = Vec::new();
        for (key, at) in index.iter() {
            let value = read_value(&mut log.file, *at)?;

            record.clear();
            encode_record(&mut record, RecordKind::Put, key, &value);
            writer.write_all(&record)?;

            let value_offset = offset + (RECORD_HEADER_LEN + key.len()) as u64;
            compacted.insert(key.clone(), ValueRef { offset: value_offset, len: at.len });
            offset += record.len() as u64;
        }

        let tmp = writer.into_inner().map_err(|e| e.into_error())?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, self.shared.path.join(DATA_FILE))?;

        log.file = tmp;
        log.size = offset;
        *index = compacted;

        debug!(before, after = offset, "compacted log");
        Ok(())
    }
}

impl Stater for ToonStore {
    fn stat(&self) -> Result<StoreStats> {
        self.check_open()?;

        let index = self.shared.index.read();
        let log_bytes = self.shared.log.lock().size;
        let live_bytes = index
            .iter()
            .map(|(key, at)| (RECORD_HEADER_LEN + key.len() + at.len as usize) as u64)
            .sum::<u64>()
            + HEADER_LEN as u64;

        Ok(StoreStats {
            keys: index.len(),
            log_bytes,
            live_bytes,
        })
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if !*self.closed.get_mut() {
            let _ = self.log.get_mut().file.sync_all();
        }
    }
}

/// Reject keys the log cannot hold
pub(crate) fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(Error::EmptyKey);
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(Error::KeyTooLarge(key.len()));
    }
    Ok(())
}

/// Reject entries the log cannot hold
pub(crate) fn check_entry(key: &[u8], value: &[u8]) -> Result<()> {
    check_key(key)?;
    if value.len() > MAX_VALUE_SIZE {
        return Err(Error::ValueTooLarge(value.len()));
    }
    Ok(())
}

fn read_value(file: &mut File, at: ValueRef) -> Result<Vec<u8>> {
    file.seek(SeekFrom::Start(at.offset))?;
    let mut value = vec![0u8; at.len as usize];
    file.read_exact(&mut value)?;
    Ok(value)
}

/// Apply records found at log offset `base` to the index.
///
/// Returns the number of bytes consumed, which is short of `records.len()`
/// only when the last record is torn.
fn index_records(index: &mut Index, records: &[u8], base: u64) -> Result<u64> {
    let mut rest = records;

    while !rest.is_empty() {
        let offset = base + (records.len() - rest.len()) as u64;
        match parse_record(rest) {
            Ok((remaining, record)) => {
                match record.kind {
                    RecordKind::Put => {
                        let value_offset = offset + (RECORD_HEADER_LEN + record.key.len()) as u64;
                        index.insert(
                            record.key.to_vec(),
                            ValueRef {
                                offset: value_offset,
                                len: record.value.len() as u32,
                            },
                        );
                    }
                    RecordKind::Delete => {
                        index.remove(record.key);
                    }
                }
                rest = remaining;
            }
            Err(nom::Err::Error(e)) if e.code == ErrorKind::Eof => break,
            Err(_) => {
                return Err(Error::Parse(format!("Corrupt record at offset {}", offset)));
            }
        }
    }

    Ok((records.len() - rest.len()) as u64)
}

/// Rebuild the index from the log, truncating a torn final record
fn load_index(file: &File) -> Result<(Index, u64)> {
    // SAFETY: the map is read-only and dropped before the file is modified.
    // No other handle to this log is open during load.
    let map = unsafe { Mmap::map(file)? };
    parse_header(&map)?;

    let mut index = Index::new();
    let consumed = index_records(&mut index, &map[HEADER_LEN..], HEADER_LEN as u64)?;
    let valid = HEADER_LEN as u64 + consumed;
    let total = map.len() as u64;
    drop(map);

    if valid < total {
        warn!(valid, dropped = total - valid, "truncating torn record at end of log");
        file.set_len(valid)?;
    }

    Ok((index, valid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::Batch;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_open() {
        let dir = TempDir::new().unwrap();
        let db = ToonStore::open(dir.path()).unwrap();

        assert_eq!(db.len(), 0);
        assert!(db.is_empty());

        db.close().unwrap();

        let db = ToonStore::open(dir.path()).unwrap();
        assert_eq!(db.len(), 0);
    }

    #[test]
    fn test_put_and_get() {
        let dir = TempDir::new().unwrap();
        let db = ToonStore::open(dir.path()).unwrap();

        db.put(b"user:1", b"alice").unwrap();

        assert_eq!(db.get(b"user:1").unwrap(), b"alice");
        assert!(db.has(b"user:1").unwrap());
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_overwrite() {
        let dir = TempDir::new().unwrap();
        let db = ToonStore::open(dir.path()).unwrap();

        db.put(b"a", b"1").unwrap();
        db.put(b"a", b"2").unwrap();

        assert_eq!(db.get(b"a").unwrap(), b"2");
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let db = ToonStore::open(dir.path()).unwrap();

        db.put(b"a", b"1").unwrap();
        db.delete(b"a").unwrap();

        assert!(!db.has(b"a").unwrap());
        assert!(matches!(db.get(b"a"), Err(Error::NotFound)));
    }

    #[test]
    fn test_delete_missing_key() {
        let dir = TempDir::new().unwrap();
        let db = ToonStore::open(dir.path()).unwrap();

        db.delete(b"never-written").unwrap();
        assert!(db.is_empty());
    }

    #[test]
    fn test_get_not_found() {
        let dir = TempDir::new().unwrap();
        let db = ToonStore::open(dir.path()).unwrap();

        assert!(matches!(db.get(b"missing"), Err(Error::NotFound)));
    }

    #[test]
    fn test_entry_limits() {
        let dir = TempDir::new().unwrap();
        let db = ToonStore::open(dir.path()).unwrap();

        let large_value = vec![b'x'; MAX_VALUE_SIZE + 1];
        assert!(matches!(db.put(b"k", &large_value), Err(Error::ValueTooLarge(_))));

        let large_key = vec![b'k'; MAX_KEY_SIZE + 1];
        assert!(matches!(db.put(&large_key, b"v"), Err(Error::KeyTooLarge(_))));
        assert!(matches!(db.delete(&large_key), Err(Error::KeyTooLarge(_))));

        assert!(matches!(db.put(b"", b"v"), Err(Error::EmptyKey)));
        assert!(db.is_empty());
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();

        {
            let db = ToonStore::open(dir.path()).unwrap();
            db.put(b"a", b"1").unwrap();
            db.put(b"b", b"2").unwrap();
            db.put(b"a", b"3").unwrap();
            db.delete(b"b").unwrap();
            db.close().unwrap();
        }

        {
            let db = ToonStore::open(dir.path()).unwrap();
            assert_eq!(db.len(), 1);
            assert_eq!(db.get(b"a").unwrap(), b"3");
            assert!(!db.has(b"b").unwrap());
        }
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();

        let size_after_good_write = {
            let db = ToonStore::open(dir.path()).unwrap();
            db.put(b"good", b"value").unwrap();
            let size = db.stat().unwrap().log_bytes;
            db.close().unwrap();
            size
        };

        // Simulate a crash halfway through appending a record
        let mut partial = Vec::new();
        encode_record(&mut partial, RecordKind::Put, b"torn", b"lost value");
        partial.truncate(partial.len() / 2);
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join(DATA_FILE))
            .unwrap();
        file.write_all(&partial).unwrap();
        drop(file);

        let db = ToonStore::open(dir.path()).unwrap();
        assert_eq!(db.get(b"good").unwrap(), b"value");
        assert!(!db.has(b"torn").unwrap());
        assert_eq!(db.stat().unwrap().log_bytes, size_after_good_write);

        db.put(b"after", b"recovery").unwrap();
        db.close().unwrap();

        let db = ToonStore::open(dir.path()).unwrap();
        assert_eq!(db.get(b"after").unwrap(), b"recovery");
    }

    #[test]
    fn test_corrupt_record_is_error() {
        let dir = TempDir::new().unwrap();
        {
            let db = ToonStore::open(dir.path()).unwrap();
            db.put(b"key", b"value").unwrap();
            db.close().unwrap();
        }

        let path = dir.path().join(DATA_FILE);
        let mut bytes = fs::read(&path).unwrap();
        bytes[HEADER_LEN] = 0xff;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(ToonStore::open(dir.path()), Err(Error::Parse(_))));
    }

    #[test]
    fn test_iter_prefix_and_start() {
        let dir = TempDir::new().unwrap();
        let db = ToonStore::open(dir.path()).unwrap();

        for key in ["acct:3", "acct:1", "user:1", "acct:2", "ac"] {
            db.put(key.as_bytes(), key.to_uppercase().as_bytes()).unwrap();
        }

        let keys: Vec<_> = db.iter(b"acct:", b"").unwrap().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"acct:1".to_vec(), b"acct:2".to_vec(), b"acct:3".to_vec()]);

        let from_two: Vec<_> = db.iter(b"acct:", b"2").unwrap().collect();
        assert_eq!(from_two.len(), 2);
        assert_eq!(from_two[0], (b"acct:2".to_vec(), b"ACCT:2".to_vec()));

        assert_eq!(db.iter(b"", b"").unwrap().len(), 5);
    }

    #[test]
    fn test_compact() {
        let dir = TempDir::new().unwrap();
        let db = ToonStore::open(dir.path()).unwrap();

        for i in 0..50u32 {
            db.put(b"hot", &i.to_le_bytes()).unwrap();
        }
        db.put(b"cold", b"stays").unwrap();
        db.put(b"gone", b"soon").unwrap();
        db.delete(b"gone").unwrap();

        let before = db.stat().unwrap();
        db.compact().unwrap();
        let after = db.stat().unwrap();

        assert!(after.log_bytes < before.log_bytes);
        assert_eq!(after.log_bytes, after.live_bytes);
        assert_eq!(db.get(b"hot").unwrap(), 49u32.to_le_bytes());
        assert_eq!(db.get(b"cold").unwrap(), b"stays");
        assert!(!db.has(b"gone").unwrap());

        // Writes after compaction land in the new log
        db.put(b"new", b"entry").unwrap();
        db.close().unwrap();

        let db = ToonStore::open(dir.path()).unwrap();
        assert_eq!(db.len(), 3);
        assert_eq!(db.get(b"new").unwrap(), b"entry");
    }

    #[test]
    fn test_close_twice() {
        let dir = TempDir::new().unwrap();
        let db = ToonStore::open(dir.path()).unwrap();

        db.close().unwrap();
        db.close().unwrap();
    }

    #[test]
    fn test_ops_after_close() {
        let dir = TempDir::new().unwrap();
        let db = ToonStore::open(dir.path()).unwrap();
        let mut batch = db.new_batch();
        batch.put(b"k", b"v").unwrap();

        db.close().unwrap();

        assert!(matches!(db.put(b"k", b"v"), Err(Error::Closed)));
        assert!(matches!(db.get(b"k"), Err(Error::Closed)));
        assert!(matches!(batch.write(), Err(Error::Closed)));
    }
}
