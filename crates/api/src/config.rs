use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use gridlab_cache::CacheConfig;
use gridlab_core::types::JobClass;
use gridlab_events::bus::DEFAULT_QUEUE_CAPACITY;
use gridlab_supervisor::{SupervisorConfig, WorkerCommand};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Streaming routes
    /// are exempt.
    pub request_timeout_secs: u64,
    /// Time allowed for running jobs to wind down on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Job supervisor settings (work dir, worker commands, timings).
    pub supervisor: SupervisorConfig,
    /// Progress streaming settings.
    pub stream: StreamConfig,
    /// Result cache sizing and placement.
    pub cache: CacheConfig,
}

/// Progress stream settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Idle interval after which a keep-alive frame is sent (default: `15`).
    pub keepalive_secs: u64,
    /// Per-subscriber queue bound (default: `1024`).
    pub queue_capacity: usize,
}

impl StreamConfig {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: 15,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                                    |
    /// |---------------------------|--------------------------------------------|
    /// | `HOST`                    | `0.0.0.0`                                  |
    /// | `PORT`                    | `3000`                                     |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`                    |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `30`                                       |
    /// | `GRIDLAB_WORK_DIR`        | `./data/jobs`                              |
    /// | `FORECAST_WORKER_CMD`     | `python3 workers/forecast.py`              |
    /// | `PROFILE_WORKER_CMD`      | `python3 workers/profile_generation.py`    |
    /// | `OPTIMIZATION_WORKER_CMD` | `python3 workers/network_optimization.py`  |
    /// | `JOB_CANCEL_GRACE_SECS`   | `10`                                       |
    /// | `JOB_WATCHDOG_SECS`       | `3600`                                     |
    /// | `JOB_RETENTION_SECS`      | `3600`                                     |
    /// | `STREAM_KEEPALIVE_SECS`   | `15`                                       |
    /// | `STREAM_QUEUE_CAPACITY`   | `1024`                                     |
    /// | `CACHE_DIR`               | `./data/cache` (empty disables disk tier)  |
    /// | `CACHE_MEMORY_ENTRIES`    | `32`                                       |
    /// | `CACHE_DISK_BYTES`        | `1073741824`                               |
    ///
    /// Panics on unparseable values; misconfiguration should fail at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_parse("PORT", "3000");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_parse("REQUEST_TIMEOUT_SECS", "30");
        let shutdown_timeout_secs: u64 = env_parse("SHUTDOWN_TIMEOUT_SECS", "30");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            supervisor: supervisor_from_env(),
            stream: StreamConfig {
                keepalive_secs: env_parse("STREAM_KEEPALIVE_SECS", "15"),
                queue_capacity: env_parse("STREAM_QUEUE_CAPACITY", "1024"),
            },
            cache: cache_from_env(),
        }
    }
}

fn supervisor_from_env() -> SupervisorConfig {
    let work_dir = std::env::var("GRIDLAB_WORK_DIR").unwrap_or_else(|_| "./data/jobs".into());

    let workers = [
        (JobClass::Forecast, "FORECAST_WORKER_CMD", "python3 workers/forecast.py"),
        (
            JobClass::ProfileGeneration,
            "PROFILE_WORKER_CMD",
            "python3 workers/profile_generation.py",
        ),
        (
            JobClass::NetworkOptimization,
            "OPTIMIZATION_WORKER_CMD",
            "python3 workers/network_optimization.py",
        ),
    ];

    let mut config = SupervisorConfig::new(PathBuf::from(work_dir));
    for (class, var, default) in workers {
        let command_line = std::env::var(var).unwrap_or_else(|_| default.into());
        let command = WorkerCommand::parse(&command_line)
            .unwrap_or_else(|| panic!("{var} must not be blank"));
        config = config.with_worker(class, command);
    }

    SupervisorConfig {
        cancel_grace: Duration::from_secs(env_parse("JOB_CANCEL_GRACE_SECS", "10")),
        watchdog_timeout: Duration::from_secs(env_parse("JOB_WATCHDOG_SECS", "3600")),
        retention: Duration::from_secs(env_parse("JOB_RETENTION_SECS", "3600")),
        ..config
    }
}

fn cache_from_env() -> CacheConfig {
    let disk_dir = std::env::var("CACHE_DIR").unwrap_or_else(|_| "./data/cache".into());
    CacheConfig {
        memory_entries: env_parse("CACHE_MEMORY_ENTRIES", "32"),
        disk_dir: (!disk_dir.trim().is_empty()).then(|| PathBuf::from(disk_dir)),
        disk_max_bytes: env_parse("CACHE_DISK_BYTES", "1073741824"),
    }
}

/// Parse `var` from the environment, falling back to `default`.
fn env_parse<T>(var: &str, default: &str) -> T
where
    T: FromStr,
    T::Err: Display,
{
    let raw = std::env::var(var).unwrap_or_else(|_| default.into());
    raw.trim()
        .parse()
        .unwrap_or_else(|e| panic!("{var} must be a valid {}: {e}", std::any::type_name::<T>()))
}
