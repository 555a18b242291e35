//! Error types for toonkv

use std::fmt;
use std::io;

/// Result type alias for toonkv operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for store operations
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(io::Error),

    /// Corrupt or unreadable log data
    Parse(String),

    /// Keys must contain at least one byte
    EmptyKey,

    /// Key too large (max 64 KiB)
    KeyTooLarge(usize),

    /// Value too large (max 1 MiB)
    ValueTooLarge(usize),

    /// Log full (max 1 GiB)
    DatabaseFull(u64),

    /// Key not found
    NotFound,

    /// Store is closed
    Closed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Parse(msg) => write!(f, "Parse error: {}", msg),
            Error::EmptyKey => write!(f, "Empty key"),
            Error::KeyTooLarge(size) => write!(f, "Key too large: {} bytes (max 64 KiB)", size),
            Error::ValueTooLarge(size) => write!(f, "Value too large: {} bytes (max 1 MiB)", size),
            Error::DatabaseFull(size) => write!(f, "Database full: {} bytes (max 1 GiB)", size),
            Error::NotFound => write!(f, "Key not found"),
            Error::Closed => write!(f, "Store is closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        Error::Parse(format!("{:?}", err))
    }
}
