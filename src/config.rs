use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_AOF_PATH: &str = "appendonly.aof";
pub const DEFAULT_AOF_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_AOF_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Process settings, normally read from `ZEDIS_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    /// Append-only log location; `None` keeps everything in memory only.
    pub aof_path: Option<PathBuf>,
    /// How often the log writer wakes up to drain queued commands.
    pub aof_flush_interval: Duration,
    /// Bound on queued-but-unwritten commands before writers block.
    pub aof_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: DEFAULT_ADDR.to_string(),
            aof_path: Some(PathBuf::from(DEFAULT_AOF_PATH)),
            aof_flush_interval: DEFAULT_AOF_FLUSH_INTERVAL,
            aof_queue_capacity: DEFAULT_AOF_QUEUE_CAPACITY,
        }
    }
}

impl Config {
    /// Reads `ZEDIS_ADDR`, `ZEDIS_AOF_PATH`, `ZEDIS_DISABLE_PERSISTENCE`,
    /// `ZEDIS_AOF_FLUSH_INTERVAL_MS` and `ZEDIS_AOF_QUEUE_CAPACITY`.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let bind_addr = env::var("ZEDIS_ADDR").unwrap_or(defaults.bind_addr);

        let disabled = env::var("ZEDIS_DISABLE_PERSISTENCE")
            .map(|v| !v.is_empty() && v != "0")
            .unwrap_or(false);
        let aof_path = if disabled {
            None
        } else {
            env::var_os("ZEDIS_AOF_PATH")
                .map(PathBuf::from)
                .or(defaults.aof_path)
        };

        let flush_ms = env_number("ZEDIS_AOF_FLUSH_INTERVAL_MS", 1000u64);
        let capacity = env_number("ZEDIS_AOF_QUEUE_CAPACITY", defaults.aof_queue_capacity);

        Config {
            bind_addr,
            aof_path,
            aof_flush_interval: Duration::from_millis(flush_ms.max(1)),
            aof_queue_capacity: capacity.max(1),
        }
    }
}

fn env_number<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("ignoring {name}={raw:?}: not a number, using {default}");
            default
        }),
        Err(_) => default,
    }
}
