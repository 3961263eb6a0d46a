//! # Sync Service
//!
//! The driver task around a [`SyncEngine`]: runs the first cycle, turns
//! [`EngineEvent`]s from the live channel into live refreshes, optionally
//! runs a full resync on a timer and stops on the shutdown token.
//!
//! [`launch`] wires a service and a [`LiveChannel`] together and spawns both.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::core::orchestrator::{CommitOutcome, SyncEngine};
use crate::ingestors::{ChannelSettings, ConnectionState, EngineEvent, LiveChannel, PushTransport};

/// Queue depth between the live channel and the service.
const EVENT_QUEUE: usize = 32;

/// Owns the engine's event loop.
pub struct SyncService {
    engine: Arc<SyncEngine>,
    events: mpsc::Receiver<EngineEvent>,
    full_resync: Option<Duration>,
}

impl SyncService {
    /// A service fed by `events`. `full_resync` enables a periodic full cycle.
    pub fn new(
        engine: Arc<SyncEngine>,
        events: mpsc::Receiver<EngineEvent>,
        full_resync: Option<Duration>,
    ) -> Self {
        Self {
            engine,
            events,
            full_resync,
        }
    }

    /// The engine being driven.
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Runs until `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                log::info!("Sync service stopped before the first cycle finished.");
                return;
            }
            _ = self.full_cycle() => {}
        }

        let mut resync = self.full_resync.map(|period| {
            let mut t = interval_at(Instant::now() + period, period);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        });
        let mut events_open = true;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                ev = self.events.recv(), if events_open => match ev {
                    Some(EngineEvent::RefreshLive(reason)) => {
                        log::debug!("Live refresh requested ({:?}).", reason);
                        self.live_refresh().await;
                    }
                    None => {
                        log::info!("Live channel gone; continuing without push updates.");
                        events_open = false;
                    }
                },
                _ = tick(&mut resync) => {
                    log::info!("Scheduled full resync.");
                    self.full_cycle().await;
                }
            }
        }
        log::info!("Sync service stopped.");
    }

    async fn full_cycle(&self) {
        // the reconcile keeps running on its own task
        if let Err(e) = self.engine.run_cycle().await {
            log::error!("Sync cycle failed: {}", e);
        }
    }

    async fn live_refresh(&self) {
        // no live gameweek known yet: only a full cycle can find it
        if self.engine.snapshot().latest_period.is_none() {
            self.full_cycle().await;
            return;
        }
        match self.engine.refresh_live().await {
            Ok(CommitOutcome::Committed) => {}
            Ok(outcome) => log::debug!("Live refresh not committed: {:?}", outcome),
            Err(e) => log::warn!("Live refresh failed: {}", e),
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Handles to a launched engine.
#[derive(Debug)]
pub struct Running {
    /// The engine; subscribe to it for snapshots.
    pub engine: Arc<SyncEngine>,
    /// Connection status of the live channel.
    pub connection: watch::Receiver<ConnectionState>,
    /// The service task.
    pub service: JoinHandle<()>,
    /// The live channel task.
    pub channel: JoinHandle<()>,
}

impl Running {
    /// Waits for both tasks after `shutdown` has been cancelled.
    pub async fn join(self) {
        let _ = self.channel.await;
        let _ = self.service.await;
    }
}

/// Spawns the live channel and the service around `engine`. Both stop when
/// `shutdown` is cancelled.
pub fn launch(
    engine: Arc<SyncEngine>,
    transport: Arc<dyn PushTransport>,
    settings: ChannelSettings,
    full_resync: Option<Duration>,
    shutdown: &CancellationToken,
) -> Running {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE);
    let (channel, connection) = LiveChannel::new(transport, settings, tx);
    let service = SyncService::new(Arc::clone(&engine), rx, full_resync);

    let channel = tokio::spawn(channel.run(shutdown.child_token()));
    let service = tokio::spawn(service.run(shutdown.child_token()));

    Running {
        engine,
        connection,
        service,
        channel,
    }
}
