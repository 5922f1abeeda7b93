use std::env;
use std::path::PathBuf;

/// Worker configuration, defaults with environment overrides.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    /// Concurrent consumer tasks, each bound to its own sandbox slot
    pub worker_count: usize,
    /// Isolation slots available to the pool
    pub box_pool_size: u32,
    /// Explicit path to the isolate binary; resolved from PATH when unset
    pub isolate_path: Option<PathBuf>,
    /// TTL on published results, in seconds
    pub result_ttl_secs: u64,
}

impl Config {
    pub const DEFAULT_WORKER_COUNT: usize = 10;
    pub const DEFAULT_RESULT_TTL_SECS: u64 = 3600;

    pub fn from_env() -> Self {
        let worker_count = env::var("WORKER_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::DEFAULT_WORKER_COUNT);
        Self {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            worker_count,
            box_pool_size: env::var("BOX_POOL_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(worker_count as u32),
            isolate_path: env::var("ISOLATE_PATH").ok().map(PathBuf::from),
            result_ttl_secs: env::var("RESULT_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(Self::DEFAULT_RESULT_TTL_SECS),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
