//! # Live Update Channel
//!
//! Keeps the push subscription alive and turns change notifications into
//! [`EngineEvent::RefreshLive`] requests for the sync service.
//!
//! ## State machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//!                    ^   |          |
//!                    |   v          v  (error, close, silence)
//!               ReconnectWait{n, min(base*2^n, cap)}
//!                        |
//!                        v  (attempts exhausted)
//!                  PollingFallback  -- RefreshLive every poll interval,
//!                                      fresh connect attempt every cap
//! ```
//!
//! Every attempt opens a brand-new connection through the transport. A
//! successful connect resets the attempt counter and stops the poll ticker.
//! A notification is a signal only: its payload is never read.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::configs::SyncConfig;
use crate::error::ChannelError;
use crate::ingestors::backoff::Backoff;
use crate::ingestors::transport::{Frame, PushMessage, PushStream, PushTransport};

/// Connection status, published on a `watch` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not running.
    Disconnected,
    /// Opening a connection.
    Connecting,
    /// Stream open.
    Connected,
    /// Waiting before reconnect attempt `attempt`.
    ReconnectWait {
        /// 1-based attempt number.
        attempt: u32,
        /// Wait before the attempt.
        delay: Duration,
    },
    /// Reconnects exhausted; refreshing on a timer. The degraded-connection
    /// indicator.
    PollingFallback,
}

impl ConnectionState {
    /// `true` only for [`ConnectionState::PollingFallback`].
    pub fn is_degraded(&self) -> bool {
        matches!(self, ConnectionState::PollingFallback)
    }
}

/// Why a live refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// The server pushed a change notification.
    Push,
    /// The fallback poll interval fired.
    Poll,
}

/// Typed requests from the channel to the sync service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Refresh the live gameweek only.
    RefreshLive(RefreshReason),
}

/// Timing knobs for the channel.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// First reconnect delay.
    pub base_delay: Duration,
    /// Reconnect delay cap and fallback reconnect period.
    pub max_delay: Duration,
    /// Reconnect attempts before polling.
    pub max_attempts: u32,
    /// Poll period while degraded.
    pub poll_interval: Duration,
    /// Silence tolerated on an open stream; `None` disables the watchdog.
    pub silent_timeout: Option<Duration>,
}

impl From<&SyncConfig> for ChannelSettings {
    fn from(cfg: &SyncConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(cfg.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(cfg.reconnect_max_delay_ms),
            max_attempts: cfg.max_reconnect_attempts,
            poll_interval: Duration::from_secs(cfg.fallback_poll_interval_secs),
            silent_timeout: (cfg.silent_failure_timeout_secs > 0)
                .then(|| Duration::from_secs(cfg.silent_failure_timeout_secs)),
        }
    }
}

/// How a connected session ended.
enum SessionEnd {
    Shutdown,
    Failed(ChannelError),
}

/// The push subscription driver. Consumed by [`LiveChannel::run`].
pub struct LiveChannel {
    transport: Arc<dyn PushTransport>,
    settings: ChannelSettings,
    events: mpsc::Sender<EngineEvent>,
    state: watch::Sender<ConnectionState>,
}

impl LiveChannel {
    /// Builds the channel. The returned receiver follows its state.
    pub fn new(
        transport: Arc<dyn PushTransport>,
        settings: ChannelSettings,
        events: mpsc::Sender<EngineEvent>,
    ) -> (Self, watch::Receiver<ConnectionState>) {
        let (state, rx) = watch::channel(ConnectionState::Disconnected);
        (
            Self {
                transport,
                settings,
                events,
                state,
            },
            rx,
        )
    }

    /// Another receiver for the connection state.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|cur| {
            if *cur == next {
                false
            } else {
                log::debug!("Live channel: {:?} -> {:?}", cur, next);
                *cur = next;
                true
            }
        });
    }

    /// Runs until `shutdown` fires or the event receiver goes away. On exit
    /// the connection is closed, the poll ticker is stopped and the state is
    /// `Disconnected`.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut backoff = Backoff::new(
            self.settings.base_delay,
            self.settings.max_delay,
            self.settings.max_attempts,
        );
        let mut fallback: Option<CancellationToken> = None;

        loop {
            if fallback.is_none() {
                self.set_state(ConnectionState::Connecting);
            }

            let attempt = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                r = self.transport.connect() => r,
            };

            match attempt {
                Ok(mut stream) => {
                    log::info!("Live channel connected.");
                    backoff.reset();
                    if let Some(ticker) = fallback.take() {
                        log::info!("Live channel restored; polling fallback stopped.");
                        ticker.cancel();
                    }
                    self.set_state(ConnectionState::Connected);

                    let end = self.session(stream.as_mut(), &shutdown).await;
                    stream.close().await;
                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Failed(e) => log::warn!("Live channel lost: {}", e),
                    }
                }
                Err(e) => log::warn!("Live channel connect failed: {}", e),
            }

            if self.events.is_closed() {
                break;
            }

            let delay = if fallback.is_some() {
                backoff.cap()
            } else {
                match backoff.next_delay() {
                    Some((attempt, delay)) => {
                        log::info!(
                            "Live channel reconnect attempt {} in {}ms",
                            attempt,
                            delay.as_millis()
                        );
                        self.set_state(ConnectionState::ReconnectWait { attempt, delay });
                        delay
                    }
                    None => {
                        log::warn!(
                            "Live channel: {} reconnect attempts failed, polling every {}s",
                            backoff.attempts(),
                            self.settings.poll_interval.as_secs()
                        );
                        fallback = Some(self.start_polling(&shutdown));
                        self.set_state(ConnectionState::PollingFallback);
                        backoff.cap()
                    }
                }
            };

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        if let Some(ticker) = fallback.take() {
            ticker.cancel();
        }
        self.set_state(ConnectionState::Disconnected);
        log::info!("Live channel stopped.");
    }

    /// Reads one connection until it fails or shutdown.
    async fn session(&self, stream: &mut dyn PushStream, shutdown: &CancellationToken) -> SessionEnd {
        let mut last_frame = Instant::now();
        loop {
            let deadline = self.settings.silent_timeout.map(|t| last_frame + t);
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return SessionEnd::Shutdown,
                _ = watchdog(deadline) => {
                    let secs = self.settings.silent_timeout.map_or(0, |t| t.as_secs());
                    return SessionEnd::Failed(ChannelError::Inactive(secs));
                }
                frame = stream.next_frame() => match frame {
                    Ok(Some(Frame::KeepAlive)) => last_frame = Instant::now(),
                    Ok(Some(Frame::Data(text))) => {
                        last_frame = Instant::now();
                        if let Some(end) = self.handle(&text).await {
                            return end;
                        }
                    }
                    Ok(None) => {
                        return SessionEnd::Failed(ChannelError::Stream("closed by server".into()))
                    }
                    Err(e) => return SessionEnd::Failed(e),
                },
            }
        }
    }

    /// Acts on one message. `Some` ends the session.
    async fn handle(&self, text: &str) -> Option<SessionEnd> {
        let msg = match serde_json::from_str::<PushMessage>(text) {
            Ok(m) => m,
            Err(e) => {
                log::debug!("Live channel: ignoring unparseable frame: {}", e);
                return None;
            }
        };
        match msg {
            PushMessage::PeriodUpdated { .. } => {
                log::info!("Live channel: gameweek updated, requesting live refresh.");
                if self
                    .events
                    .send(EngineEvent::RefreshLive(RefreshReason::Push))
                    .await
                    .is_err()
                {
                    return Some(SessionEnd::Shutdown);
                }
                None
            }
            PushMessage::Error { message } => Some(SessionEnd::Failed(ChannelError::Server(message))),
            PushMessage::Connected { .. } | PushMessage::Heartbeat { .. } | PushMessage::Unknown => None,
        }
    }

    /// Starts the fallback ticker. Cancel the returned token to stop it;
    /// it also stops with `shutdown`.
    fn start_polling(&self, shutdown: &CancellationToken) -> CancellationToken {
        let token = shutdown.child_token();
        let stop = token.clone();
        let events = self.events.clone();
        let period = self.settings.poll_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        log::debug!("Polling fallback: requesting live refresh.");
                        if events.send(EngineEvent::RefreshLive(RefreshReason::Poll)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        token
    }
}

async fn watchdog(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
