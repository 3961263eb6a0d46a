//! # Sync Configuration
//!
//! [`SyncConfig`] is the fully resolved configuration the engine runs with.
//! [`SyncConfigLayer`] is the same set of keys with every field optional:
//! one layer per source (defaults, JSON file, CLI/env), folded together with
//! [`SyncConfigLayer::merge`] where the later layer wins field by field.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Which cache backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// Process-local map.
    #[default]
    Memory,
    /// One JSON file per entry under `cache_dir`.
    File,
    /// Redis at `redis_url`.
    Redis,
}

impl std::str::FromStr for CacheBackendKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "file" | "disk" => Ok(Self::File),
            "redis" => Ok(Self::Redis),
            other => Err(SyncError::Config(format!("unknown cache backend '{other}'"))),
        }
    }
}

/// Resolved engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Base URL of the data API.
    pub api_base: String,
    /// Push channel URL. `http(s)` selects SSE, `ws(s)` selects WebSocket.
    pub live_url: String,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
    /// Retries for transient HTTP failures.
    pub http_max_retries: u32,
    /// Cache backend.
    pub cache_backend: CacheBackendKind,
    /// Directory for the file backend.
    pub cache_dir: PathBuf,
    /// Byte budget for the memory and file backends; `0` means unbounded.
    pub cache_capacity: usize,
    /// Connection string for the Redis backend.
    pub redis_url: String,
    /// Cache schema version. Bumping it invalidates every stored entry.
    pub schema_version: u32,
    /// First reconnect delay.
    pub reconnect_base_delay_ms: u64,
    /// Reconnect delay cap; also the retry period while polling.
    pub reconnect_max_delay_ms: u64,
    /// Failed attempts before falling back to polling.
    pub max_reconnect_attempts: u32,
    /// Live refresh period while polling.
    pub fallback_poll_interval_secs: u64,
    /// Silence on an open push stream before it is considered dead.
    pub silent_failure_timeout_secs: u64,
    /// Period of a full resync cycle; `0` disables it.
    pub full_resync_interval_secs: u64,
    /// Log file directory.
    pub log_dir: PathBuf,
    /// Log level name.
    pub log_level: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let api_base = "http://127.0.0.1:8080/".to_string();
        Self {
            live_url: format!("{api_base}sse/fpl-updates"),
            api_base,
            request_timeout_secs: 15,
            http_max_retries: 3,
            cache_backend: CacheBackendKind::Memory,
            cache_dir: PathBuf::from("./cache"),
            cache_capacity: 64 * 1024 * 1024,
            redis_url: "redis://127.0.0.1:6379/".to_string(),
            schema_version: 1,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 5,
            fallback_poll_interval_secs: 300,
            // server heartbeats every 30s
            silent_failure_timeout_secs: 90,
            full_resync_interval_secs: 0,
            log_dir: PathBuf::from("./logs"),
            log_level: "info".to_string(),
        }
    }
}

impl SyncConfig {
    /// Checks the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), SyncError> {
        url::Url::parse(&self.api_base)
            .map_err(|e| SyncError::Config(format!("apiBase '{}': {e}", self.api_base)))?;
        url::Url::parse(&self.live_url)
            .map_err(|e| SyncError::Config(format!("liveUrl '{}': {e}", self.live_url)))?;
        if self.request_timeout_secs == 0 {
            return Err(SyncError::Config("requestTimeoutSecs must be > 0".into()));
        }
        if self.reconnect_base_delay_ms == 0 || self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            return Err(SyncError::Config(
                "reconnect delays must satisfy 0 < base <= max".into(),
            ));
        }
        if self.fallback_poll_interval_secs == 0 {
            return Err(SyncError::Config("fallbackPollIntervalSecs must be > 0".into()));
        }
        Ok(())
    }

    /// `request_timeout_secs` as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Full resync period, if enabled.
    pub fn full_resync_interval(&self) -> Option<Duration> {
        (self.full_resync_interval_secs > 0).then(|| Duration::from_secs(self.full_resync_interval_secs))
    }
}

/// A partial configuration from one source. Fields mirror [`SyncConfig`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfigLayer {
    pub api_base: Option<String>,
    pub live_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub http_max_retries: Option<u32>,
    pub cache_backend: Option<CacheBackendKind>,
    pub cache_dir: Option<PathBuf>,
    pub cache_capacity: Option<usize>,
    pub redis_url: Option<String>,
    pub schema_version: Option<u32>,
    pub reconnect_base_delay_ms: Option<u64>,
    pub reconnect_max_delay_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub fallback_poll_interval_secs: Option<u64>,
    pub silent_failure_timeout_secs: Option<u64>,
    pub full_resync_interval_secs: Option<u64>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl SyncConfigLayer {
    /// Overlays `other` on `self`; `Some` values in `other` win.
    pub fn merge(self, other: SyncConfigLayer) -> SyncConfigLayer {
        SyncConfigLayer {
            api_base: other.api_base.or(self.api_base),
            live_url: other.live_url.or(self.live_url),
            request_timeout_secs: other.request_timeout_secs.or(self.request_timeout_secs),
            http_max_retries: other.http_max_retries.or(self.http_max_retries),
            cache_backend: other.cache_backend.or(self.cache_backend),
            cache_dir: other.cache_dir.or(self.cache_dir),
            cache_capacity: other.cache_capacity.or(self.cache_capacity),
            redis_url: other.redis_url.or(self.redis_url),
            schema_version: other.schema_version.or(self.schema_version),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            max_reconnect_attempts: other.max_reconnect_attempts.or(self.max_reconnect_attempts),
            fallback_poll_interval_secs: other
                .fallback_poll_interval_secs
                .or(self.fallback_poll_interval_secs),
            silent_failure_timeout_secs: other
                .silent_failure_timeout_secs
                .or(self.silent_failure_timeout_secs),
            full_resync_interval_secs: other
                .full_resync_interval_secs
                .or(self.full_resync_interval_secs),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }

    /// Reads a JSON layer from `path`. A missing or unreadable file yields
    /// `None` with a log line; it is not an error.
    pub fn from_file(path: &Path) -> Option<SyncConfigLayer> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}. Using defaults and environment/CLI variables.",
                path.display()
            );
            return None;
        }
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                log::warn!("Failed to read config file {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<SyncConfigLayer>(&text) {
            Ok(layer) => Some(layer),
            Err(e) => {
                log::warn!("Failed to parse config file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Fills the gaps from [`SyncConfig::default`] and validates the result.
    /// A live URL left unset follows `api_base`.
    pub fn resolve(self) -> Result<SyncConfig, SyncError> {
        let d = SyncConfig::default();
        let api_base = normalize_base(self.api_base.unwrap_or(d.api_base));
        let live_url = self
            .live_url
            .unwrap_or_else(|| format!("{api_base}sse/fpl-updates"));
        let cfg = SyncConfig {
            api_base,
            live_url,
            request_timeout_secs: self.request_timeout_secs.unwrap_or(d.request_timeout_secs),
            http_max_retries: self.http_max_retries.unwrap_or(d.http_max_retries),
            cache_backend: self.cache_backend.unwrap_or(d.cache_backend),
            cache_dir: self.cache_dir.unwrap_or(d.cache_dir),
            cache_capacity: self.cache_capacity.unwrap_or(d.cache_capacity),
            redis_url: self.redis_url.unwrap_or(d.redis_url),
            schema_version: self.schema_version.unwrap_or(d.schema_version),
            reconnect_base_delay_ms: self.reconnect_base_delay_ms.unwrap_or(d.reconnect_base_delay_ms),
            reconnect_max_delay_ms: self.reconnect_max_delay_ms.unwrap_or(d.reconnect_max_delay_ms),
            max_reconnect_attempts: self.max_reconnect_attempts.unwrap_or(d.max_reconnect_attempts),
            fallback_poll_interval_secs: self
                .fallback_poll_interval_secs
                .unwrap_or(d.fallback_poll_interval_secs),
            silent_failure_timeout_secs: self
                .silent_failure_timeout_secs
                .unwrap_or(d.silent_failure_timeout_secs),
            full_resync_interval_secs: self
                .full_resync_interval_secs
                .unwrap_or(d.full_resync_interval_secs),
            log_dir: self.log_dir.unwrap_or(d.log_dir),
            log_level: self.log_level.unwrap_or(d.log_level),
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Relative joins need a trailing slash on the base.
fn normalize_base(mut base: String) -> String {
    if !base.ends_with('/') {
        base.push('/');
    }
    base
}
