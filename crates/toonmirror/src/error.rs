//! Error types for toonmirror
//!
//! Backend errors are wrapped as-is so callers can tell which side failed
//! and still reach the original error through `source()`.

use std::fmt;

/// Result type alias for mirrored operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for cache backend operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors raised by a cache backend
#[derive(Debug)]
pub enum CacheError {
    /// Connection, timeout, protocol or server error from Redis
    Redis(redis::RedisError),

    /// No pooled connection could be checked out in time
    Pool(r2d2::Error),

    /// Command refused before it was queued or sent
    Rejected(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Redis(e) => write!(f, "Redis error: {}", e),
            CacheError::Pool(e) => write!(f, "Cache connection pool error: {}", e),
            CacheError::Rejected(msg) => write!(f, "Cache rejected command: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Redis(e) => Some(e),
            CacheError::Pool(e) => Some(e),
            CacheError::Rejected(_) => None,
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Redis(err)
    }
}

impl From<r2d2::Error> for CacheError {
    fn from(err: r2d2::Error) -> Self {
        CacheError::Pool(err)
    }
}

/// Errors returned by [`MirroredStore`](crate::MirroredStore) and
/// [`MirroredBatch`](crate::MirroredBatch)
#[derive(Debug)]
pub enum Error {
    /// The cache side failed. The primary was not touched by this call.
    Cache(CacheError),

    /// The primary store failed
    Store(toonkv::Error),

    /// Invalid configuration
    Config(String),
}

impl Error {
    /// True when the primary store reported a missing key
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Store(toonkv::Error::NotFound))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Cache(e) => write!(f, "cache: {}", e),
            Error::Store(e) => write!(f, "primary store: {}", e),
            Error::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Cache(e) => Some(e),
            Error::Store(e) => Some(e),
            Error::Config(_) => None,
        }
    }
}

impl From<CacheError> for Error {
    fn from(err: CacheError) -> Self {
        Error::Cache(err)
    }
}

impl From<toonkv::Error> for Error {
    fn from(err: toonkv::Error) -> Self {
        Error::Store(err)
    }
}
