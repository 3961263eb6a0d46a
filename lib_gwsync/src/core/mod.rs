//! # Core Engine Module
//!
//! The synchronization engine proper.
//!
//! ## Core Components:
//!
//! - **`orchestrator`**: [`SyncEngine`], which runs fetch cycles, suppresses
//!   stale results by token compare and publishes [`LeagueSnapshot`]s.
//! - **`snapshot`**: the published view and the cycle token.
//! - **`service`**: [`SyncService`], the event loop that feeds live-channel
//!   events and scheduled resyncs into the engine, and [`launch`], which
//!   spawns it next to a live channel.

/// Fetch cycles and commits.
pub mod orchestrator;
/// Event loop and task wiring.
pub mod service;
/// Published view types.
pub mod snapshot;

pub use orchestrator::{CommitOutcome, CycleHandle, CyclePhase, SyncEngine};
pub use service::{launch, Running, SyncService};
pub use snapshot::{CycleToken, LeagueSnapshot, SnapshotPhase};
