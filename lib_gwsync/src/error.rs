//! # Error Types
//!
//! Every failure the engine can observe, grouped by how far it is allowed to
//! travel. Only [`SyncError::Manifest`] and [`SyncError::LivePeriodFetch`]
//! abort a cycle and reach the published snapshot; the rest are absorbed
//! where they happen and only show up in the logs.

use thiserror::Error;

/// Errors surfaced by the orchestrator and its collaborators.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The manifest could not be fetched or decoded. Fatal for the cycle.
    #[error("manifest unavailable: {0}")]
    Manifest(String),

    /// The live (latest) gameweek could not be fetched. Fatal for the cycle.
    #[error("live gameweek {period} unavailable: {reason}")]
    LivePeriodFetch {
        /// The gameweek that was being fetched.
        period: u32,
        /// Why it failed.
        reason: String,
    },

    /// The background history batch failed. The affected gameweeks degrade
    /// to empty results.
    #[error("history batch for gameweeks {periods:?} failed: {reason}")]
    HistoricalPeriodFetch {
        /// The gameweeks that were requested.
        periods: Vec<u32>,
        /// Why it failed.
        reason: String,
    },

    /// A lower-level HTTP failure.
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The push channel could not be set up.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl SyncError {
    /// `true` for the errors that end a cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Manifest(_) | SyncError::LivePeriodFetch { .. })
    }
}

/// Errors raised by the HTTP retrieval layer.
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// The base URL or a joined path was not a valid URL.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// Building the underlying client failed.
    #[error("http client setup failed: {0}")]
    Client(#[source] reqwest::Error),

    /// The request never produced a response (after retries).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest_middleware::Error),

    /// The response body could not be read or decoded.
    #[error("response decoding failed: {0}")]
    Decode(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("http status {status} for {path}: {body}")]
    Status {
        /// Numeric HTTP status.
        status: u16,
        /// The requested path.
        path: String,
        /// The (possibly truncated) error body.
        body: String,
    },
}

/// Errors raised by cache backends. Never propagated past [`crate::cache::CacheStore`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend is out of space.
    #[error("cache capacity exceeded")]
    Capacity,

    /// The stored value could not be decoded.
    #[error("corrupt cache value: {0}")]
    Corrupt(String),

    /// Any other backend failure.
    #[error("cache backend failure: {0}")]
    Backend(String),
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        // ENOSPC / EDQUOT
        match e.raw_os_error() {
            Some(28) | Some(122) => CacheError::Capacity,
            _ => CacheError::Backend(e.to_string()),
        }
    }
}

/// Errors that drive the live channel's reconnect state machine.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The established stream failed.
    #[error("stream error: {0}")]
    Stream(String),

    /// The server sent an explicit error message.
    #[error("server reported error: {0}")]
    Server(String),

    /// Nothing arrived for longer than the inactivity timeout.
    #[error("no frames for {0}s")]
    Inactive(u64),

    /// The live URL uses a scheme no transport handles.
    #[error("unsupported live url scheme: {0}")]
    UnsupportedScheme(String),
}
