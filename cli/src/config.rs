use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lib_gwsync::configs::{CacheBackendKind, SyncConfig, SyncConfigLayer};

#[derive(Parser, Debug, Clone, Default)]
#[clap(name = "gw-sync", about = "Gameweek standings synchronizer", version)]
pub struct Cli {
    #[clap(long, env = "GWSYNC_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "GWSYNC_API_BASE", help = "Base URL of the data API.")]
    pub api_base: Option<String>,

    #[clap(long, env = "GWSYNC_LIVE_URL", help = "Push channel URL (http(s) for SSE, ws(s) for WebSocket).")]
    pub live_url: Option<String>,

    #[clap(long, env = "GWSYNC_REQUEST_TIMEOUT_SECS", help = "Per-request HTTP timeout in seconds.")]
    pub request_timeout_secs: Option<u64>,

    #[clap(long, env = "GWSYNC_HTTP_MAX_RETRIES", help = "Retries for transient HTTP failures.")]
    pub http_max_retries: Option<u32>,

    #[clap(long, env = "GWSYNC_CACHE_BACKEND", help = "Cache backend: memory, file or redis.")]
    pub cache_backend: Option<String>,

    #[clap(long, env = "GWSYNC_CACHE_DIR", help = "Directory for the file cache backend.")]
    pub cache_dir: Option<PathBuf>,

    #[clap(long, env = "GWSYNC_CACHE_CAPACITY", help = "Cache byte budget (memory/file), 0 for unbounded.")]
    pub cache_capacity: Option<usize>,

    #[clap(long, env = "GWSYNC_REDIS_URL", help = "Redis URL for the redis cache backend.")]
    pub redis_url: Option<String>,

    #[clap(long, env = "GWSYNC_SCHEMA_VERSION", help = "Cache schema version; bump to invalidate all entries.")]
    pub schema_version: Option<u32>,

    #[clap(long, env = "GWSYNC_RECONNECT_BASE_DELAY_MS", help = "Base delay in milliseconds for live channel reconnects.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(long, env = "GWSYNC_RECONNECT_MAX_DELAY_MS", help = "Maximum delay in milliseconds for live channel reconnects.")]
    pub reconnect_max_delay_ms: Option<u64>,

    #[clap(long, env = "GWSYNC_MAX_RECONNECT_ATTEMPTS", help = "Reconnect attempts before falling back to polling.")]
    pub max_reconnect_attempts: Option<u32>,

    #[clap(long, env = "GWSYNC_FALLBACK_POLL_INTERVAL_SECS", help = "Live refresh period while polling.")]
    pub fallback_poll_interval_secs: Option<u64>,

    #[clap(long, env = "GWSYNC_SILENT_FAILURE_TIMEOUT_SECS", help = "Seconds of push silence before reconnecting, 0 to disable.")]
    pub silent_failure_timeout_secs: Option<u64>,

    #[clap(long, env = "GWSYNC_FULL_RESYNC_INTERVAL_SECS", help = "Seconds between full resync cycles, 0 to disable.")]
    pub full_resync_interval_secs: Option<u64>,

    #[clap(long, env = "GWSYNC_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "GWSYNC_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, help = "Run one cycle, print the standings and exit.")]
    pub once: bool,

    #[clap(long, help = "Print snapshots as JSON instead of a table.")]
    pub json: bool,
}

impl Cli {
    fn layer(&self) -> Result<SyncConfigLayer> {
        let cache_backend = self
            .cache_backend
            .as_deref()
            .map(str::parse::<CacheBackendKind>)
            .transpose()
            .context("invalid --cache-backend")?;
        Ok(SyncConfigLayer {
            api_base: self.api_base.clone(),
            live_url: self.live_url.clone(),
            request_timeout_secs: self.request_timeout_secs,
            http_max_retries: self.http_max_retries,
            cache_backend,
            cache_dir: self.cache_dir.clone(),
            cache_capacity: self.cache_capacity,
            redis_url: self.redis_url.clone(),
            schema_version: self.schema_version,
            reconnect_base_delay_ms: self.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.reconnect_max_delay_ms,
            max_reconnect_attempts: self.max_reconnect_attempts,
            fallback_poll_interval_secs: self.fallback_poll_interval_secs,
            silent_failure_timeout_secs: self.silent_failure_timeout_secs,
            full_resync_interval_secs: self.full_resync_interval_secs,
            log_dir: self.log_dir.clone(),
            log_level: self.log_level.clone(),
        })
    }
}

/// Defaults, then the config file, then env/CLI.
pub fn resolve(cli: &Cli) -> Result<SyncConfig> {
    let path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("gw_sync.conf"));

    let file = SyncConfigLayer::from_file(&path).unwrap_or_default();
    let merged = file.merge(cli.layer()?);
    Ok(merged.resolve()?)
}
