//! tmirror - command-line access to a ToonStore mirrored into a cache

mod import;

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use toonkv::ToonStore;
use toonmirror::{
    CacheConfig, CacheStore, LocalCache, MirroredStore, RedisCache, ENV_CACHE_URL,
    ENV_CONNECT_TIMEOUT_MS, ENV_IO_TIMEOUT_MS, ENV_MAX_CONNECTIONS,
};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory of the primary store
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    /// Cache endpoint (`redis://host:port/db`), or `local` for an
    /// in-process cache
    #[arg(short, long, env = ENV_CACHE_URL)]
    cache: String,

    /// Connect timeout in milliseconds
    #[arg(long, env = ENV_CONNECT_TIMEOUT_MS, default_value_t = 5000)]
    connect_timeout_ms: u64,

    /// Per-command read/write timeout in milliseconds
    #[arg(long, env = ENV_IO_TIMEOUT_MS)]
    io_timeout_ms: Option<u64>,

    /// Size of the cache connection pool
    #[arg(long, env = ENV_MAX_CONNECTIONS, default_value_t = 8)]
    max_connections: u32,

    /// Capacity (number of keys) of the `local` cache
    #[arg(long, default_value_t = 10000)]
    local_capacity: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set a key in the cache, then in the store
    Put { key: String, value: String },

    /// Delete a key from the cache, then from the store
    Delete { key: String },

    /// Print a value from the store
    Get { key: String },

    /// Report whether the store holds a key
    Has { key: String },

    /// List keys and values under a prefix
    Scan {
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Load `key<TAB>value` and `-key` lines through mirrored batches
    Import {
        file: PathBuf,

        /// Write the batch once its queued keys and values reach this size
        #[arg(long, default_value_t = 1024 * 1024)]
        batch_bytes: usize,
    },

    /// Rewrite the store's log without dead records
    Compact,

    /// Print store usage
    Stat,

    /// Check that the Redis cache answers (not available with `--cache local`)
    Ping,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.cache == "local" {
        let cache = LocalCache::new(args.local_capacity.max(1));
        info!(capacity = cache.capacity(), "using in-process cache");
        return run(&args, cache);
    }

    let config = CacheConfig::new(args.cache.clone())
        .with_connect_timeout(Duration::from_millis(args.connect_timeout_ms))
        .with_io_timeout(args.io_timeout_ms.map(Duration::from_millis))
        .with_max_connections(args.max_connections);
    let cache = RedisCache::open(config)?;

    if let Command::Ping = args.command {
        cache.ping().context("cache did not answer")?;
        println!("PONG");
        return Ok(());
    }

    run(&args, cache)
}

fn run<C: CacheStore>(args: &Args, cache: C) -> Result<()> {
    std::fs::create_dir_all(&args.data)
        .with_context(|| format!("creating {}", args.data.display()))?;
    let store = ToonStore::open(&args.data)
        .with_context(|| format!("opening store at {}", args.data.display()))?;
    let mirror = MirroredStore::new(Arc::new(store), cache);

    let mut out = io::stdout().lock();
    match &args.command {
        Command::Put { key, value } => {
            mirror.put(key.as_bytes(), value.as_bytes())?;
            writeln!(out, "OK")?;
        }
        Command::Delete { key } => {
            mirror.delete(key.as_bytes())?;
            writeln!(out, "OK")?;
        }
        Command::Get { key } => match mirror.get(key.as_bytes()) {
            Ok(value) => {
                out.write_all(&value)?;
                writeln!(out)?;
            }
            Err(e) if e.is_not_found() => {
                writeln!(out, "(nil)")?;
            }
            Err(e) => return Err(e.into()),
        },
        Command::Has { key } => {
            let found = mirror.has(key.as_bytes())?;
            writeln!(out, "{}", found)?;
        }
        Command::Scan { prefix } => {
            for (key, value) in mirror.iter(prefix.as_bytes(), b"")? {
                writeln!(
                    out,
                    "{}\t{}",
                    String::from_utf8_lossy(&key),
                    String::from_utf8_lossy(&value)
                )?;
            }
        }
        Command::Import { file, batch_bytes } => {
            let reader = BufReader::new(
                File::open(file).with_context(|| format!("opening {}", file.display()))?,
            );
            let summary = import::import(&mirror, reader, (*batch_bytes).max(1))?;
            writeln!(
                out,
                "imported {} puts, {} deletes in {} batches",
                summary.puts, summary.deletes, summary.batches
            )?;
        }
        Command::Compact => {
            let before = mirror.stat()?;
            mirror.compact()?;
            let after = mirror.stat()?;
            writeln!(
                out,
                "compacted {} -> {} bytes",
                before.log_bytes, after.log_bytes
            )?;
        }
        Command::Stat => {
            let stats = mirror.stat()?;
            writeln!(out, "keys:        {}", stats.keys)?;
            writeln!(out, "log_bytes:   {}", stats.log_bytes)?;
            writeln!(out, "live_bytes:  {}", stats.live_bytes)?;
        }
        // Redis is pinged in main before a store is opened
        Command::Ping => bail!("ping needs a Redis cache; `--cache local` has no server to reach"),
    }

    let counters = mirror.stats().snapshot();
    debug!(?counters, "mirror counters");

    mirror.primary().close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(dir: &TempDir, command: &[&str]) -> Args {
        let data = dir.path().to_str().unwrap();
        let mut argv = vec!["tmirror", "--data", data, "--cache", "local"];
        argv.extend_from_slice(command);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_ping_rejects_local_cache() {
        let dir = TempDir::new().unwrap();
        let args = parse(&dir, &["ping"]);

        let err = run(&args, LocalCache::new(8)).unwrap_err();
        assert!(err.to_string().contains("Redis"));
    }

    #[test]
    fn test_put_then_get_with_local_cache() {
        let dir = TempDir::new().unwrap();
        let cache = LocalCache::new(8);

        run(&parse(&dir, &["put", "user:1", "alice"]), cache.clone()).unwrap();
        assert_eq!(cache.get(b"user:1"), Some(b"alice".to_vec()));

        run(&parse(&dir, &["delete", "user:1"]), cache.clone()).unwrap();
        assert!(!cache.contains(b"user:1"));
    }
}
