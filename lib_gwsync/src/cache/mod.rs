//! # Cache Module
//!
//! Persistent storage of closed gameweeks' aggregated tables, validated by
//! content hash and schema version before reuse.
//!
//! ## Contained Modules:
//!
//! - **`store`**: [`CacheStore`], the validating front the orchestrator
//!   uses, with capacity-driven eviction and the [`CacheBackend`] trait.
//! - **`memory`**: process-local backend with a byte budget.
//! - **`file`**: one JSON file per entry in a directory.
//! - **`cache_redis`**: async Redis backend (feature `redis-cache`).
//!
//! Keys look like `gwsync:v{schema}:gw{gameweek}`, so a schema bump leaves
//! every older entry unreachable until it is evicted.

/// Validating cache front and backend trait.
pub mod store;

/// In-memory backend.
pub mod memory;

/// Directory-of-files backend.
pub mod file;

/// Redis backend.
#[cfg(feature = "redis-cache")]
pub mod cache_redis;

pub use file::FileBackend;
pub use memory::MemoryBackend;
#[cfg(feature = "redis-cache")]
pub use cache_redis::RedisBackend;
pub use store::{cache_key, CacheBackend, CacheEntry, CacheStore, KEY_PREFIX};
