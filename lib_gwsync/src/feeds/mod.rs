//! # Data Feeds
//!
//! Everything the engine reads from the remote source of truth.
//!
//! ## Contained Modules:
//!
//! - **`manifest`**: the period -> content-hash map that drives every cycle.
//! - **`source`**: the [`GameweekSource`] trait the orchestrator fetches
//!   through, plus the history batch, period status, fixtures and chips
//!   payloads.
//! - **`http_source`**: the production source over the data API.

/// Manifest model and decoding.
pub mod manifest;

/// The fetch seam used by the orchestrator.
pub mod source;

/// `GameweekSource` over HTTP.
pub mod http_source;

pub use http_source::HttpGameweekSource;
pub use manifest::{Manifest, ManifestEntry};
pub use source::{FixtureData, GameweekSource, HistoryBatch, NextDeadline, PeriodStatus};
