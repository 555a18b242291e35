//! Bulk loading from a line-oriented text file
//!
//! Each line is one operation:
//! - `key<TAB>value` puts `value` under `key`
//! - `-key` deletes `key`
//!
//! Blank lines and lines starting with `#` are skipped. A line holding a tab
//! is always a put, so keys that start with `-` can still be written.

use std::io::BufRead;

use anyhow::{bail, Context, Result};
use toonkv::KeyValueStore;
use toonmirror::{CacheStore, MirroredStore};
use tracing::{debug, info};

/// One parsed line
#[derive(Debug, PartialEq, Eq)]
pub enum ImportOp<'a> {
    Put(&'a [u8], &'a [u8]),
    Delete(&'a [u8]),
}

/// Totals for a finished import
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub puts: usize,
    pub deletes: usize,
    pub batches: usize,
}

pub fn parse_line(line: &[u8]) -> Result<Option<ImportOp<'_>>> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.is_empty() || line[0] == b'#' {
        return Ok(None);
    }

    if let Some(tab) = line.iter().position(|&b| b == b'\t') {
        return Ok(Some(ImportOp::Put(&line[..tab], &line[tab + 1..])));
    }
    if let Some(key) = line.strip_prefix(b"-") {
        return Ok(Some(ImportOp::Delete(key)));
    }

    bail!("expected `key<TAB>value` or `-key`")
}

/// Stream `reader` into `mirror`, writing a batch each time its queued size
/// reaches `batch_bytes`
pub fn import<S, C, R>(
    mirror: &MirroredStore<S, C>,
    mut reader: R,
    batch_bytes: usize,
) -> Result<ImportSummary>
where
    S: KeyValueStore,
    C: CacheStore,
    R: BufRead,
{
    let mut batch = mirror.new_batch_with_size(batch_bytes);
    let mut summary = ImportSummary::default();
    let mut line = Vec::new();
    let mut lineno = 0usize;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        lineno += 1;

        let raw = line.strip_suffix(b"\n").unwrap_or(line.as_slice());
        let op = parse_line(raw).with_context(|| format!("line {}", lineno))?;
        match op {
            Some(ImportOp::Put(key, value)) => {
                batch
                    .put(key, value)
                    .with_context(|| format!("line {}", lineno))?;
                summary.puts += 1;
            }
            Some(ImportOp::Delete(key)) => {
                batch.delete(key).with_context(|| format!("line {}", lineno))?;
                summary.deletes += 1;
            }
            None => continue,
        }

        if batch.value_size() >= batch_bytes {
            debug!(ops = batch.len(), bytes = batch.value_size(), line = lineno, "flushing import batch");
            batch
                .write()
                .with_context(|| format!("writing batch ending at line {}", lineno))?;
            summary.batches += 1;
        }
    }

    if !batch.is_empty() {
        batch.write().context("writing final batch")?;
        summary.batches += 1;
    }

    info!(
        puts = summary.puts,
        deletes = summary.deletes,
        batches = summary.batches,
        "import finished"
    );
    Ok(summary)
}
