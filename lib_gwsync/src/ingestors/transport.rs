//! # Push Transports
//!
//! The live channel does not care how frames arrive. A [`PushTransport`]
//! opens a fresh [`PushStream`] per connection attempt:
//!
//! - **SSE** (`http://`, `https://`): a streaming GET whose body is split
//!   into `data:` events; `:` comment lines count as keep-alives.
//! - **WebSocket** (`ws://`, `wss://`, feature `websocket`): text frames;
//!   ping and pong count as keep-alives.
//!
//! Both yield the same JSON messages, decoded into [`PushMessage`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ChannelError;

/// A message from the push server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// Sent once after the stream opens.
    Connected {
        /// Server time, seconds.
        #[serde(default)]
        timestamp: Option<i64>,
    },
    /// Periodic keep-alive.
    Heartbeat {
        /// Server time, seconds.
        #[serde(default)]
        timestamp: Option<i64>,
    },
    /// The live gameweek changed. Any payload is ignored by the engine.
    #[serde(alias = "gameweek_updated")]
    PeriodUpdated {
        /// Whatever the server attached.
        #[serde(default)]
        data: Option<Value>,
    },
    /// The server reports a failure on its side.
    Error {
        /// Server-supplied reason.
        #[serde(default)]
        message: String,
    },
    /// Any other type.
    #[serde(other)]
    Unknown,
}

/// One unit read from a push stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A message payload (JSON text).
    Data(String),
    /// Transport-level keep-alive with no payload.
    KeepAlive,
}

/// An open push connection.
#[async_trait]
pub trait PushStream: Send {
    /// Next frame; `Ok(None)` when the server closed the stream.
    async fn next_frame(&mut self) -> Result<Option<Frame>, ChannelError>;

    /// Closes the connection.
    async fn close(&mut self);
}

/// Opens push connections.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// A brand-new connection; never reuses a previous one.
    async fn connect(&self) -> Result<Box<dyn PushStream>, ChannelError>;
}

/// Picks the transport for `url` by scheme.
pub fn transport_for(url: &str, connect_timeout: Duration) -> Result<Arc<dyn PushTransport>, ChannelError> {
    let parsed = url::Url::parse(url).map_err(|e| ChannelError::Connect(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(Arc::new(SseTransport::new(url, connect_timeout)?)),
        #[cfg(feature = "websocket")]
        "ws" | "wss" => Ok(Arc::new(WsTransport::new(url, connect_timeout))),
        other => Err(ChannelError::UnsupportedScheme(other.to_string())),
    }
}

// --- Server-Sent Events ---

/// Largest unterminated event the decoder will hold.
pub const MAX_EVENT_BYTES: usize = 1024 * 1024;

/// Incremental `text/event-stream` decoder.
#[derive(Debug)]
pub struct SseDecoder {
    buf: Vec<u8>,
    limit: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_EVENT_BYTES)
    }
}

impl SseDecoder {
    /// Decoder that fails once an unterminated event exceeds `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    /// Feeds a chunk and returns every frame it completes.
    ///
    /// Fails with [`ChannelError::Stream`] when the bytes left after the
    /// last complete event exceed the limit; the buffer is dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>, ChannelError> {
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buf.drain(..pos + 2).collect();
            let text = String::from_utf8_lossy(&block[..pos]);

            let mut data: Vec<&str> = Vec::new();
            let mut comment = false;
            for line in text.split('\n') {
                if let Some(rest) = line.strip_prefix("data:") {
                    data.push(rest.strip_prefix(' ').unwrap_or(rest));
                } else if line.starts_with(':') {
                    comment = true;
                }
                // event:, id:, retry: carry nothing we use
            }

            if !data.is_empty() {
                frames.push(Frame::Data(data.join("\n")));
            } else if comment {
                frames.push(Frame::KeepAlive);
            }
        }

        if self.buf.len() > self.limit {
            let held = self.buf.len();
            self.buf = Vec::new();
            return Err(ChannelError::Stream(format!(
                "event exceeds {} bytes without terminator ({} buffered)",
                self.limit, held
            )));
        }
        Ok(frames)
    }
}

/// SSE over a streaming `reqwest` response.
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: reqwest::Client,
    url: String,
}

impl SseTransport {
    /// Transport for `url`. Only connecting is time-limited; the stream
    /// itself is watched for inactivity by the channel.
    pub fn new(url: &str, connect_timeout: Duration) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

struct SseStream {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<Frame>,
}

#[async_trait]
impl PushTransport for SseTransport {
    async fn connect(&self) -> Result<Box<dyn PushStream>, ChannelError> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Connect(format!("http status {status}")));
        }

        Ok(Box::new(SseStream {
            body: response.bytes_stream().boxed(),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
        }))
    }
}

#[async_trait]
impl PushStream for SseStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>, ChannelError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.pending.extend(self.decoder.push(&chunk)?),
                Some(Err(e)) => return Err(ChannelError::Stream(e.to_string())),
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) {
        // dropping the body closes the connection
        self.body = futures_util::stream::empty().boxed();
        self.pending.clear();
    }
}

// --- WebSocket ---

#[cfg(feature = "websocket")]
pub use ws::WsTransport;

#[cfg(feature = "websocket")]
mod ws {
    use std::time::Duration;

    use async_trait::async_trait;
    use futures_util::StreamExt;
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::protocol::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use super::{Frame, PushStream, PushTransport};
    use crate::error::ChannelError;

    /// WebSocket push transport.
    #[derive(Debug, Clone)]
    pub struct WsTransport {
        url: String,
        connect_timeout: Duration,
    }

    impl WsTransport {
        /// Transport for a `ws://` or `wss://` URL.
        pub fn new(url: &str, connect_timeout: Duration) -> Self {
            Self {
                url: url.to_string(),
                connect_timeout,
            }
        }
    }

    struct WsStream {
        inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    }

    #[async_trait]
    impl PushTransport for WsTransport {
        async fn connect(&self) -> Result<Box<dyn PushStream>, ChannelError> {
            let (inner, _) = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
                .await
                .map_err(|_| ChannelError::Connect("connect timed out".into()))?
                .map_err(|e| ChannelError::Connect(e.to_string()))?;
            Ok(Box::new(WsStream { inner }))
        }
    }

    #[async_trait]
    impl PushStream for WsStream {
        async fn next_frame(&mut self) -> Result<Option<Frame>, ChannelError> {
            loop {
                return match self.inner.next().await {
                    Some(Ok(Message::Text(text))) => Ok(Some(Frame::Data(text.to_string()))),
                    Some(Ok(Message::Binary(bin))) => match String::from_utf8(bin.to_vec()) {
                        Ok(text) => Ok(Some(Frame::Data(text))),
                        Err(_) => continue,
                    },
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => Ok(Some(Frame::KeepAlive)),
                    Some(Ok(Message::Close(_))) | None => Ok(None),
                    Some(Ok(Message::Frame(_))) => continue,
                    Some(Err(e)) => Err(ChannelError::Stream(e.to_string())),
                };
            }
        }

        async fn close(&mut self) {
            let _ = self.inner.close(None).await;
        }
    }
}
