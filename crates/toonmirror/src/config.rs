//! Cache connection configuration
//!
//! There is no default endpoint: the address is always supplied by the
//! embedding process, either directly or through the environment.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable holding the cache URL
pub const ENV_CACHE_URL: &str = "TOONMIRROR_CACHE_URL";

/// Environment variable holding the connect timeout in milliseconds
pub const ENV_CONNECT_TIMEOUT_MS: &str = "TOONMIRROR_CONNECT_TIMEOUT_MS";

/// Environment variable holding the read/write timeout in milliseconds
pub const ENV_IO_TIMEOUT_MS: &str = "TOONMIRROR_IO_TIMEOUT_MS";

/// Environment variable holding the connection pool size
pub const ENV_MAX_CONNECTIONS: &str = "TOONMIRROR_MAX_CONNECTIONS";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_CONNECTIONS: u32 = 8;

/// Connection settings for a Redis cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Endpoint, e.g. `redis://cache.internal:6379/0`
    pub url: String,

    /// Time allowed to establish a connection
    pub connect_timeout: Duration,

    /// Read and write timeout per command; `None` blocks indefinitely
    pub io_timeout: Option<Duration>,

    /// Upper bound on pooled connections, idle or in use
    pub max_connections: u32,
}

impl CacheConfig {
    /// Configuration for the given endpoint
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-command read/write timeout
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Set the connection pool size
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Read the configuration from `TOONMIRROR_*` environment variables.
    ///
    /// `TOONMIRROR_CACHE_URL` is required.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(ENV_CACHE_URL)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{} is not set", ENV_CACHE_URL)))?;

        let mut config = Self::new(url.trim());

        if let Some(ms) = lookup(ENV_CONNECT_TIMEOUT_MS) {
            config.connect_timeout = Duration::from_millis(parse_number(ENV_CONNECT_TIMEOUT_MS, &ms)?);
        }
        if let Some(ms) = lookup(ENV_IO_TIMEOUT_MS) {
            config.io_timeout = Some(Duration::from_millis(parse_number(ENV_IO_TIMEOUT_MS, &ms)?));
        }
        if let Some(n) = lookup(ENV_MAX_CONNECTIONS) {
            config.max_connections = parse_number(ENV_MAX_CONNECTIONS, &n)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::Config("cache url is empty".to_string()));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::Config("connect timeout must be positive".to_string()));
        }
        // A zero socket timeout is rejected by the OS
        if self.io_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::Config("io timeout must be positive".to_string()));
        }
        if self.max_connections == 0 {
            return Err(Error::Config("max connections must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a number, got {:?}", name, raw)))
}
