//! # Ingestors Module
//!
//! Live signals from the push server.
//!
//! ## Contained Modules:
//!
//! - **`live_channel`**: the connection state machine (connect, reconnect
//!   with backoff, polling fallback) that forwards typed [`EngineEvent`]s.
//! - **`transport`**: SSE and WebSocket push transports.
//! - **`backoff`**: the reconnect delay policy.

/// Reconnect delay policy.
pub mod backoff;

/// Push subscription state machine.
pub mod live_channel;

/// SSE and WebSocket transports.
pub mod transport;

pub use backoff::Backoff;
pub use live_channel::{ChannelSettings, ConnectionState, EngineEvent, LiveChannel, RefreshReason};
pub use transport::{transport_for, Frame, PushMessage, PushStream, PushTransport, SseDecoder, SseTransport};
#[cfg(feature = "websocket")]
pub use transport::WsTransport;
