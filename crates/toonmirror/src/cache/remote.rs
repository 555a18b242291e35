//! Redis-backed cache store

use std::sync::Arc;

use r2d2::{CustomizeConnection, HandleError, Pool};
use redis::{Client, Connection, RedisError, RedisResult};
use tracing::{debug, warn};

use super::{CacheOp, CachePipeline, CacheStore};
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult, Error, Result};

/// Largest bulk string Redis accepts by default (`proto-max-bulk-len`)
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

struct Shared {
    pool: Pool<Client>,
    config: CacheConfig,
}

/// Cache store talking to a Redis server
///
/// Connections come from an r2d2 pool and are PINGed on checkout, so a
/// socket the server closed while idle is replaced before a command is sent.
/// A command that fails is not retried.
#[derive(Clone)]
pub struct RedisCache {
    shared: Arc<Shared>,
}

impl RedisCache {
    /// Create a cache for the configured endpoint. No connection is made
    /// until the first command.
    pub fn open(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::open(config.url.as_str())
            .map_err(|e| Error::Config(format!("invalid cache url {:?}: {}", config.url, e)))?;

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(0))
            .connection_timeout(config.connect_timeout)
            .test_on_check_out(true)
            .connection_customizer(Box::new(SocketTimeouts {
                io_timeout: config.io_timeout,
            }))
            .error_handler(Box::new(LogErrors))
            .build_unchecked(client);

        Ok(Self {
            shared: Arc::new(Shared { pool, config }),
        })
    }

    /// Configuration this cache was opened with
    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    /// Round-trip a PING
    pub fn ping(&self) -> CacheResult<()> {
        self.with_connection(|conn| redis::cmd("PING").query::<String>(conn))
            .map(|_| ())
    }

    /// Connections currently parked in the pool
    pub fn idle_connections(&self) -> usize {
        self.shared.pool.state().idle_connections as usize
    }

    fn with_connection<T, F>(&self, f: F) -> CacheResult<T>
    where
        F: FnOnce(&mut Connection) -> RedisResult<T>,
    {
        let mut conn = self.shared.pool.get()?;
        f(&mut *conn).map_err(|e| {
            if is_broken(&e) {
                warn!(error = %e, "cache connection failed");
            }
            CacheError::Redis(e)
        })
    }
}

/// Applies the per-command timeouts to each new pooled connection
#[derive(Debug)]
struct SocketTimeouts {
    io_timeout: Option<std::time::Duration>,
}

impl CustomizeConnection<Connection, RedisError> for SocketTimeouts {
    fn on_acquire(&self, conn: &mut Connection) -> RedisResult<()> {
        conn.set_read_timeout(self.io_timeout)?;
        conn.set_write_timeout(self.io_timeout)?;
        debug!("opened cache connection");
        Ok(())
    }
}

/// Routes background connection errors from the pool into tracing
#[derive(Debug)]
struct LogErrors;

impl HandleError<RedisError> for LogErrors {
    fn handle_error(&self, error: RedisError) {
        warn!(error = %error, "cache pool could not open a connection");
    }
}

impl CacheStore for RedisCache {
    type Pipeline = RedisPipeline;

    fn set(&self, key: &[u8], value: &[u8]) -> CacheResult<()> {
        check_bulk(key, value)?;
        self.with_connection(|conn| redis::cmd("SET").arg(key).arg(value).query::<()>(conn))
    }

    fn delete(&self, key: &[u8]) -> CacheResult<()> {
        check_bulk(key, &[])?;
        // DEL replies with the number of keys removed; zero is fine
        self.with_connection(|conn| redis::cmd("DEL").arg(key).query::<i64>(conn))
            .map(|_| ())
    }

    fn pipeline(&self) -> RedisPipeline {
        RedisPipeline {
            cache: self.clone(),
            queued: Vec::new(),
        }
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.pool.state();
        f.debug_struct("RedisCache")
            .field("url", &self.shared.config.url)
            .field("connections", &state.connections)
            .field("idle", &state.idle_connections)
            .finish()
    }
}

/// Queued commands for one [`RedisCache`], sent as `MULTI ... EXEC`
pub struct RedisPipeline {
    cache: RedisCache,
    queued: Vec<CacheOp>,
}

impl RedisPipeline {
    fn build(&self) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &self.queued {
            match op {
                CacheOp::Set(key, value) => {
                    pipe.cmd("SET").arg(key).arg(value).ignore();
                }
                CacheOp::Delete(key) => {
                    pipe.cmd("DEL").arg(key).ignore();
                }
            }
        }
        pipe
    }
}

impl CachePipeline for RedisPipeline {
    fn set(&mut self, key: &[u8], value: &[u8]) -> CacheResult<()> {
        check_bulk(key, value)?;
        self.queued.push(CacheOp::Set(key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> CacheResult<()> {
        check_bulk(key, &[])?;
        self.queued.push(CacheOp::Delete(key.to_vec()));
        Ok(())
    }

    fn len(&self) -> usize {
        self.queued.len()
    }

    fn truncate(&mut self, len: usize) {
        self.queued.truncate(len);
    }

    fn exec(&mut self) -> CacheResult<()> {
        if self.queued.is_empty() {
            return Ok(());
        }

        let pipe = self.build();
        self.cache.with_connection(|conn| pipe.query::<()>(conn))?;

        debug!(commands = self.queued.len(), "cache pipeline executed");
        self.queued.clear();
        Ok(())
    }

    fn discard(&mut self) {
        self.queued.clear();
    }
}

impl std::fmt::Debug for RedisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPipeline")
            .field("queued", &self.queued.len())
            .finish()
    }
}

fn check_bulk(key: &[u8], value: &[u8]) -> CacheResult<()> {
    if key.len() > MAX_BULK_LEN {
        return Err(CacheError::Rejected(format!("key of {} bytes exceeds bulk limit", key.len())));
    }
    if value.len() > MAX_BULK_LEN {
        return Err(CacheError::Rejected(format!(
            "value of {} bytes exceeds bulk limit",
            value.len()
        )));
    }
    Ok(())
}

/// Errors after which the connection cannot be trusted
fn is_broken(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_timeout()
}
