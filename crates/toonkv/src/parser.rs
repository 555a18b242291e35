//! Log format parser using nom
//!
//! File format:
//! ```text
//! TOONKV1\n
//! [version: u32]
//! ...records...
//! ```
//!
//! Record format:
//! ```text
//! [op: u8] [key_len: u32] [value_len: u32] [key] [value]
//! ```
//!
//! All integers are little-endian. Delete records carry an empty value.

use nom::{
    bytes::complete::take,
    combinator::map_opt,
    number::complete::{le_u32, le_u8},
    IResult,
};

use crate::error::{Error, Result};

/// Magic header for toonkv log files
pub const TOON_MAGIC: &[u8] = b"TOONKV1\n";

/// Current log format version
pub const FORMAT_VERSION: u32 = 1;

/// Length of the file header (magic + version)
pub const HEADER_LEN: usize = TOON_MAGIC.len() + 4;

/// Length of a record frame before the key bytes
pub const RECORD_HEADER_LEN: usize = 1 + 4 + 4;

/// Kind of a logged mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Key set to value
    Put,
    /// Key removed
    Delete,
}

impl RecordKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(RecordKind::Put),
            2 => Some(RecordKind::Delete),
            _ => None,
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            RecordKind::Put => 1,
            RecordKind::Delete => 2,
        }
    }
}

/// A record borrowed from the log
#[derive(Debug, Clone, PartialEq)]
pub struct Record<'a> {
    /// Mutation kind
    pub kind: RecordKind,
    /// Key bytes
    pub key: &'a [u8],
    /// Value bytes, empty for deletes
    pub value: &'a [u8],
}

/// Parse the log file header, returning the format version
pub fn parse_header(input: &[u8]) -> Result<u32> {
    if input.len() < HEADER_LEN {
        return Err(Error::Parse("Input too short for header".to_string()));
    }

    if &input[..TOON_MAGIC.len()] != TOON_MAGIC {
        return Err(Error::Parse("Invalid log magic header".to_string()));
    }

    let (_, version) =
        le_u32::<_, nom::error::Error<&[u8]>>(&input[TOON_MAGIC.len()..HEADER_LEN])?;
    if version != FORMAT_VERSION {
        return Err(Error::Parse(format!("Unsupported log version {}", version)));
    }

    Ok(version)
}

/// Create a log file header
pub fn create_header(version: u32) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(TOON_MAGIC);
    header.extend_from_slice(&version.to_le_bytes());
    header
}

/// Parse one record frame.
///
/// A truncated frame fails with `ErrorKind::Eof`; an unknown op byte fails
/// with `ErrorKind::MapOpt`.
pub fn parse_record(input: &[u8]) -> IResult<&[u8], Record<'_>> {
    let (input, kind) = map_opt(le_u8, RecordKind::from_byte)(input)?;
    let (input, key_len) = le_u32(input)?;
    let (input, value_len) = le_u32(input)?;
    let (input, key) = take(key_len)(input)?;
    let (input, value) = take(value_len)(input)?;

    Ok((input, Record { kind, key, value }))
}

/// Append an encoded record to `buf`
pub fn encode_record(buf: &mut Vec<u8>, kind: RecordKind, key: &[u8], value: &[u8]) {
    buf.reserve(encoded_len(key, value));
    buf.push(kind.as_byte());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
}

/// Size of a record on disk
pub fn encoded_len(key: &[u8], value: &[u8]) -> usize {
    RECORD_HEADER_LEN + key.len() + value.len()
}
