//! # Redis Cache Backend
//!
//! Async Redis storage over a [`ConnectionManager`], which reconnects on its
//! own after a dropped connection. An `OOM` reply (maxmemory reached with a
//! `noeviction` policy) maps to [`CacheError::Capacity`].

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};

use crate::cache::store::CacheBackend;
use crate::error::CacheError;

/// Redis-backed [`CacheBackend`].
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend").finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connects to `url` (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(map_err)?;
        let conn = ConnectionManager::new(client).await.map_err(map_err)?;
        Ok(Self { conn })
    }
}

fn map_err(e: RedisError) -> CacheError {
    classify(e.code(), e.to_string())
}

/// Maps a server error code onto the cache taxonomy.
fn classify(code: Option<&str>, message: String) -> CacheError {
    match code {
        Some("OOM") => CacheError::Capacity,
        _ => CacheError::Backend(message),
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<Vec<u8>>>(key).await.map_err(map_err)
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await.map_err(map_err)
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(map_err)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("KEYS")
            .arg(format!("{prefix}*"))
            .query_async::<Vec<String>>(&mut conn)
            .await
            .map_err(map_err)
    }
}
