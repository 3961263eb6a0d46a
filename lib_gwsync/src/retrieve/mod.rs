//! # Data Retrieval Module
//!
//! Shared HTTP plumbing for every request the engine makes against the data
//! API. Retries, timeouts and status handling live here so the feeds only
//! deal with paths and payloads.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: an `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`, with exponential-backoff retries of transient
//!   failures and a per-request timeout.

/// Generic HTTP API client with retry middleware.
pub mod ky_http;

pub use ky_http::{ApiClient, ApiResponse};
