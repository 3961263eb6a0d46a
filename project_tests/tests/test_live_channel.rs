//! # Live Channel Integration Tests
//!
//! Runs `LiveChannel` over a scripted push transport on a paused clock, so
//! reconnect delays, the polling fallback and the inactivity watchdog can be
//! checked to the millisecond.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

use lib_gwsync::ingestors::{
    ChannelSettings, ConnectionState, EngineEvent, Frame, LiveChannel, PushStream, PushTransport,
    RefreshReason,
};
use lib_gwsync::ChannelError;

/// How a scripted connection behaves once its frames run out.
#[derive(Clone)]
enum End {
    Hang,
    Close,
}

/// One scripted connect attempt.
#[derive(Clone)]
enum Plan {
    Refuse,
    Serve(Vec<Frame>, End),
}

struct MockTransport {
    plans: Mutex<VecDeque<Plan>>,
    connects: Mutex<Vec<Instant>>,
    closes: Arc<AtomicUsize>,
    started: Instant,
}

impl MockTransport {
    fn new(plans: Vec<Plan>) -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(plans.into()),
            connects: Mutex::new(Vec::new()),
            closes: Arc::new(AtomicUsize::new(0)),
            started: Instant::now(),
        })
    }

    fn push(&self, plan: Plan) {
        self.plans.lock().unwrap().push_back(plan);
    }

    /// Connect times in milliseconds since the transport was built.
    fn connect_offsets(&self) -> Vec<u128> {
        self.connects
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.duration_since(self.started).as_millis())
            .collect()
    }
}

struct MockStream {
    frames: VecDeque<Frame>,
    end: End,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn connect(&self) -> Result<Box<dyn PushStream>, ChannelError> {
        self.connects.lock().unwrap().push(Instant::now());
        let plan = self.plans.lock().unwrap().pop_front().unwrap_or(Plan::Refuse);
        match plan {
            Plan::Refuse => Err(ChannelError::Connect("connection refused".into())),
            Plan::Serve(frames, end) => Ok(Box::new(MockStream {
                frames: frames.into(),
                end,
                closes: Arc::clone(&self.closes),
            })),
        }
    }
}

#[async_trait]
impl PushStream for MockStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>, ChannelError> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(Some(frame));
        }
        match self.end {
            End::Hang => std::future::pending().await,
            End::Close => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn data(json: &str) -> Frame {
    Frame::Data(json.to_string())
}

fn settings(max_attempts: u32, silent: Option<u64>) -> ChannelSettings {
    ChannelSettings {
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(400),
        max_attempts,
        poll_interval: Duration::from_secs(10),
        silent_timeout: silent.map(Duration::from_secs),
    }
}

struct Harness {
    events: mpsc::Receiver<EngineEvent>,
    state: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

fn start(transport: Arc<MockTransport>, settings: ChannelSettings) -> Harness {
    let (tx, events) = mpsc::channel(32);
    let (channel, state) = LiveChannel::new(transport, settings, tx);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(channel.run(shutdown.clone()));
    Harness {
        events,
        state,
        shutdown,
        task,
    }
}

impl Harness {
    async fn next_event(&mut self, within: Duration) -> Option<EngineEvent> {
        timeout(within, self.events.recv()).await.ok().flatten()
    }

    fn drain(&mut self) {
        while self.events.try_recv().is_ok() {}
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    async fn stop(self) -> ConnectionState {
        self.shutdown.cancel();
        self.task.await.unwrap();
        let state = *self.state.borrow();
        state
    }
}

#[tokio::test(start_paused = true)]
async fn period_updated_requests_exactly_one_refresh() {
    let transport = MockTransport::new(vec![Plan::Serve(
        vec![
            data(r#"{"type":"connected","timestamp":1}"#),
            data(r#"{"type":"heartbeat","timestamp":2}"#),
            data(r#"{"type":"period_updated","data":{"gameweek":7,"rows":412}}"#),
            data("not json at all"),
            data(r#"{"type":"something_new"}"#),
            Frame::KeepAlive,
        ],
        End::Hang,
    )]);
    let mut h = start(transport.clone(), settings(3, None));

    assert_eq!(
        h.next_event(Duration::from_secs(1)).await,
        Some(EngineEvent::RefreshLive(RefreshReason::Push))
    );
    assert_eq!(h.next_event(Duration::from_secs(60)).await, None);
    assert_eq!(h.state(), ConnectionState::Connected);
    assert_eq!(transport.connect_offsets().len(), 1);

    assert_eq!(h.stop().await, ConnectionState::Disconnected);
    assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn gameweek_updated_is_an_alias() {
    let transport = MockTransport::new(vec![Plan::Serve(
        vec![data(r#"{"type":"gameweek_updated"}"#)],
        End::Hang,
    )]);
    let mut h = start(transport, settings(3, None));

    assert_eq!(
        h.next_event(Duration::from_secs(1)).await,
        Some(EngineEvent::RefreshLive(RefreshReason::Push))
    );
    assert_eq!(h.next_event(Duration::from_secs(60)).await, None);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn server_error_reconnects_on_a_fresh_connection() {
    let transport = MockTransport::new(vec![
        Plan::Serve(vec![data(r#"{"type":"error","message":"upstream down"}"#)], End::Hang),
        Plan::Serve(vec![data(r#"{"type":"period_updated"}"#)], End::Hang),
    ]);
    let mut h = start(transport.clone(), settings(3, None));

    assert_eq!(
        h.next_event(Duration::from_secs(5)).await,
        Some(EngineEvent::RefreshLive(RefreshReason::Push))
    );
    assert_eq!(transport.connect_offsets(), vec![0, 100]);
    assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    assert_eq!(h.state(), ConnectionState::Connected);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn closed_stream_resets_backoff_after_success() {
    let transport = MockTransport::new(vec![
        Plan::Refuse,
        Plan::Serve(vec![], End::Close),
        Plan::Refuse,
        Plan::Serve(vec![], End::Hang),
    ]);
    let h = start(transport.clone(), settings(3, None));

    sleep(Duration::from_secs(2)).await;
    // refuse, wait 100; close, wait 100 again (reset); refuse, wait 200
    assert_eq!(transport.connect_offsets(), vec![0, 100, 200, 400]);
    assert_eq!(h.state(), ConnectionState::Connected);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn exhausted_reconnects_fall_back_to_polling_until_recovery() {
    let transport = MockTransport::new(vec![]);
    let mut h = start(transport.clone(), settings(3, None));

    sleep(Duration::from_millis(750)).await;
    assert_eq!(transport.connect_offsets(), vec![0, 100, 300, 700]);
    assert_eq!(h.state(), ConnectionState::PollingFallback);
    assert!(h.state().is_degraded());

    // polling fires on its interval, not immediately
    assert_eq!(h.next_event(Duration::from_secs(9)).await, None);
    assert_eq!(
        h.next_event(Duration::from_secs(2)).await,
        Some(EngineEvent::RefreshLive(RefreshReason::Poll))
    );
    assert_eq!(
        h.next_event(Duration::from_secs(11)).await,
        Some(EngineEvent::RefreshLive(RefreshReason::Poll))
    );

    // reconnects continue every cap while degraded
    let attempts = transport.connect_offsets();
    let gaps: Vec<u128> = attempts.windows(2).skip(3).map(|w| w[1] - w[0]).collect();
    assert!(!gaps.is_empty());
    assert!(gaps.iter().all(|g| *g == 400), "{gaps:?}");

    transport.push(Plan::Serve(vec![], End::Hang));
    sleep(Duration::from_millis(450)).await;
    assert_eq!(h.state(), ConnectionState::Connected);

    h.drain();
    assert_eq!(h.next_event(Duration::from_secs(60)).await, None, "poll ticker stopped");
    assert_eq!(h.stop().await, ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn zero_attempts_degrades_immediately() {
    let transport = MockTransport::new(vec![]);
    let h = start(transport.clone(), settings(0, None));

    sleep(Duration::from_millis(1)).await;
    assert_eq!(h.state(), ConnectionState::PollingFallback);
    assert_eq!(transport.connect_offsets(), vec![0]);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn silence_trips_the_watchdog() {
    let transport = MockTransport::new(vec![
        Plan::Serve(vec![data(r#"{"type":"connected"}"#)], End::Hang),
        Plan::Serve(vec![data(r#"{"type":"period_updated"}"#)], End::Hang),
    ]);
    let mut h = start(transport.clone(), settings(3, Some(5)));

    assert_eq!(
        h.next_event(Duration::from_secs(10)).await,
        Some(EngineEvent::RefreshLive(RefreshReason::Push))
    );
    assert_eq!(transport.connect_offsets(), vec![0, 5100]);
    assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_reconnect_wait_stops_promptly() {
    let transport = MockTransport::new(vec![]);
    let h = start(transport.clone(), settings(3, None));

    sleep(Duration::from_millis(50)).await;
    assert!(matches!(
        h.state(),
        ConnectionState::ReconnectWait { attempt: 1, .. }
    ));
    assert_eq!(h.stop().await, ConnectionState::Disconnected);
    assert_eq!(transport.connect_offsets(), vec![0]);
}
