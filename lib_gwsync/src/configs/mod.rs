//! # Configuration Modules
//!
//! Runtime configuration for the engine. The binary layers defaults, an
//! optional JSON file and CLI/environment overrides on top of this.

/// The resolved engine configuration and its JSON overlay form.
pub mod sync_config;

pub use sync_config::{CacheBackendKind, SyncConfig, SyncConfigLayer};
