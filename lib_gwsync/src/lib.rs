//! # lib_gwsync
//!
//! The gameweek data synchronization engine. It keeps a local view of
//! per-gameweek league standings in step with a remote source that changes
//! live during the current gameweek and never changes once a gameweek closes.
//!
//! ## Layout (leaves first):
//!
//! - **`parser`**: CSV payload for one gameweek -> typed `RawRecord`s.
//! - **`aggregator`**: `RawRecord`s -> one `ParticipantPeriodStat` per manager.
//! - **`cache`**: hash- and schema-validated store of closed gameweeks, with
//!   memory, file and Redis backends.
//! - **`feeds`**: the manifest model and the `GameweekSource` seam, plus the
//!   HTTP implementation.
//! - **`core`**: the `SyncEngine` orchestrator (fetch cycles, stale-cycle
//!   suppression, published snapshots) and the `SyncService` driver.
//! - **`ingestors`**: the live push channel with reconnect, backoff and
//!   polling fallback.
//! - **`standings`**: the cumulative, cross-gameweek table.
//! - **`retrieve`**: the shared retrying HTTP client.
//! - **`configs`**: runtime configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod aggregator;
pub mod cache;
pub mod configs;
pub mod core;
pub mod error;
pub mod feeds;
pub mod ingestors;
pub mod model;
pub mod parser;
pub mod retrieve;
pub mod standings;

// --- Public API Re-exports ---
pub use crate::core::{
    CommitOutcome, CycleHandle, CyclePhase, CycleToken, LeagueSnapshot, SnapshotPhase, SyncEngine,
    SyncService,
};
pub use cache::{CacheBackend, CacheEntry, CacheStore};
pub use configs::SyncConfig;
pub use error::{CacheError, ChannelError, RetrieveError, SyncError};
pub use feeds::{GameweekSource, HttpGameweekSource, Manifest, PeriodStatus};
pub use ingestors::{ConnectionState, EngineEvent, LiveChannel};
pub use model::{ParticipantPeriodStat, PeriodOrigin, PeriodResult, PlayerLine, RawRecord};
