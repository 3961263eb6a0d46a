//! # Cache Store
//!
//! [`CacheStore`] wraps a raw [`CacheBackend`] with the rules the
//! orchestrator depends on:
//!
//! - **Validated reads**: an entry is returned only when its schema version
//!   and content hash both match. A mismatch or an undecodable value is a
//!   miss, and the stale value is evicted on the spot.
//! - **Infallible writes**: `set` never returns an error. When the backend
//!   runs out of room it drops entries from older schema versions, then
//!   (while the backend still reports no room) the least recently written
//!   entries, and retries once. A second failure means this gameweek is not
//!   cached this round.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::model::{ParticipantPeriodStat, PeriodOrigin, PeriodResult};

/// Prefix shared by every key this crate writes.
pub const KEY_PREFIX: &str = "gwsync:";

/// Storage key for `gameweek` under `schema_version`.
pub fn cache_key(schema_version: u32, gameweek: u32) -> String {
    format!("{KEY_PREFIX}v{schema_version}:gw{gameweek}")
}

/// Schema version encoded in a key, if the key is ours.
fn key_schema(key: &str) -> Option<u32> {
    key.strip_prefix(KEY_PREFIX)?
        .strip_prefix('v')?
        .split(':')
        .next()?
        .parse()
        .ok()
}

/// Raw byte storage under string keys.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Reads a value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Writes a value. Out-of-space must surface as [`CacheError::Capacity`].
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;

    /// Deletes a value. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Every stored key starting with `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, CacheError>;

    /// Whether writing `bytes` under `key` would fit right now. Backends
    /// without a local budget always say yes.
    async fn would_fit(&self, _key: &str, _bytes: usize) -> bool {
        true
    }
}

/// One cached gameweek.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Gameweek number.
    #[serde(alias = "period")]
    pub gameweek: u32,
    /// Schema version at write time.
    pub schema_version: u32,
    /// Manifest content hash at write time.
    pub hash: String,
    /// Ranked managers.
    pub participants: Vec<ParticipantPeriodStat>,
    /// Captain name -> picks.
    pub captain_tally: BTreeMap<String, u32>,
    /// Unix millis of the write.
    pub written_at: i64,
}

impl CacheEntry {
    /// Snapshot of `result` for storage under `hash`.
    pub fn new(result: &PeriodResult, hash: &str, schema_version: u32) -> Self {
        Self {
            gameweek: result.gameweek,
            schema_version,
            hash: hash.to_string(),
            participants: result.participants.clone(),
            captain_tally: result.captain_tally.clone(),
            written_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Back into a [`PeriodResult`] tagged as coming from the cache.
    pub fn into_result(self) -> PeriodResult {
        PeriodResult {
            gameweek: self.gameweek,
            participants: self.participants,
            captain_tally: self.captain_tally,
            origin: PeriodOrigin::Cache,
        }
    }
}

/// Hash- and schema-validating cache front. Cheap to clone.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    schema_version: u32,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("backend", &self.backend.name())
            .field("schema_version", &self.schema_version)
            .finish()
    }
}

impl CacheStore {
    /// Wraps `backend` for `schema_version`.
    pub fn new(backend: Arc<dyn CacheBackend>, schema_version: u32) -> Self {
        Self {
            backend,
            schema_version,
        }
    }

    /// The schema version entries are written under.
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Returns the entry for `gameweek` only if it was written under the
    /// current schema with `expected_hash`. Anything else is evicted.
    pub async fn get(&self, gameweek: u32, expected_hash: &str) -> Option<CacheEntry> {
        let key = cache_key(self.schema_version, gameweek);
        let bytes = match self.backend.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                log::debug!("Cache[{}] read {} failed: {}", self.backend.name(), key, e);
                return None;
            }
        };

        let entry = match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                log::debug!("Cache[{}] {} undecodable, evicting: {}", self.backend.name(), key, e);
                self.evict_key(&key).await;
                return None;
            }
        };

        let valid = !expected_hash.is_empty()
            && entry.hash == expected_hash
            && entry.schema_version == self.schema_version
            && entry.gameweek == gameweek;
        if !valid {
            log::debug!(
                "Cache[{}] {} stale (hash {} vs {}), evicting",
                self.backend.name(),
                key,
                entry.hash,
                expected_hash
            );
            self.evict_key(&key).await;
            return None;
        }
        Some(entry)
    }

    /// Stores `entry`. Returns whether it was written; never errors.
    pub async fn set(&self, entry: &CacheEntry) -> bool {
        let key = cache_key(self.schema_version, entry.gameweek);
        let bytes = match serde_json::to_vec(entry) {
            Ok(b) => b,
            Err(e) => {
                log::debug!("Cache: cannot encode gameweek {}: {}", entry.gameweek, e);
                return false;
            }
        };

        match self.backend.put(&key, &bytes).await {
            Ok(()) => return true,
            Err(CacheError::Capacity) => {
                log::info!(
                    "Cache[{}] full writing {}, evicting",
                    self.backend.name(),
                    key
                );
            }
            Err(e) => {
                log::debug!("Cache[{}] write {} failed: {}", self.backend.name(), key, e);
                return false;
            }
        }

        self.evict_prior_schemas().await;
        self.evict_oldest_until_fits(&key, bytes.len()).await;

        match self.backend.put(&key, &bytes).await {
            Ok(()) => true,
            Err(e) => {
                log::debug!(
                    "Cache[{}] giving up on {} this round: {}",
                    self.backend.name(),
                    key,
                    e
                );
                false
            }
        }
    }

    /// Drops the entry for `gameweek`, if any.
    pub async fn evict(&self, gameweek: u32) {
        self.evict_key(&cache_key(self.schema_version, gameweek)).await;
    }

    async fn evict_key(&self, key: &str) {
        if let Err(e) = self.backend.remove(key).await {
            log::debug!("Cache[{}] evict {} failed: {}", self.backend.name(), key, e);
        }
    }

    /// Removes every entry written under a different schema version.
    async fn evict_prior_schemas(&self) {
        let keys = match self.backend.keys(KEY_PREFIX).await {
            Ok(k) => k,
            Err(e) => {
                log::debug!("Cache[{}] key listing failed: {}", self.backend.name(), e);
                return;
            }
        };
        for key in keys {
            if key_schema(&key) != Some(self.schema_version) {
                self.evict_key(&key).await;
            }
        }
    }

    /// Removes current-schema entries, oldest write first, until the backend
    /// reports room for `bytes` under `key` or nothing else is left.
    async fn evict_oldest_until_fits(&self, key: &str, bytes: usize) {
        if self.backend.would_fit(key, bytes).await {
            return;
        }
        let keys = match self.backend.keys(KEY_PREFIX).await {
            Ok(k) => k,
            Err(_) => return,
        };

        let mut aged: Vec<(i64, String)> = Vec::with_capacity(keys.len());
        for k in keys.into_iter().filter(|k| k != key) {
            let written_at = match self.backend.get(&k).await {
                Ok(Some(raw)) => serde_json::from_slice::<CacheEntry>(&raw)
                    .map(|e| e.written_at)
                    .unwrap_or(i64::MIN),
                _ => i64::MIN,
            };
            aged.push((written_at, k));
        }
        aged.sort();

        for (_, victim) in aged {
            self.evict_key(&victim).await;
            if self.backend.would_fit(key, bytes).await {
                return;
            }
        }
    }
}
