//! # Shared Test Fixtures
//!
//! A scripted, in-memory [`GameweekSource`] with call counters and
//! per-call holds, plus small builders for CSV payloads and history rows.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use lib_gwsync::aggregator;
use lib_gwsync::cache::{CacheEntry, CacheStore, MemoryBackend};
use lib_gwsync::feeds::{FixtureData, GameweekSource, HistoryBatch, Manifest, PeriodStatus};
use lib_gwsync::model::PeriodResult;
use lib_gwsync::parser;
use lib_gwsync::{RetrieveError, SyncError};

pub const CSV_HEADER: &str = "manager_name,entry_team_name,entry_id,player,points_gw,points_applied,multiplier,is_captain,fixture_started,fixture_finished,status,player_cost,gross_points";

/// One gameweek payload: a captain row and a TOTAL row per manager.
pub fn csv(rows: &[(&str, f64)]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for (i, (name, pts)) in rows.iter().enumerate() {
        let id = i + 1;
        out.push_str(&format!(
            "{name},{name} FC,{id},Salah,{half},{pts},2,true,true,false,a,130,{pts}\n",
            half = pts / 2.0
        ));
        out.push_str(&format!("{name},{name} FC,{id},TOTAL,,{pts},,,,,,,{pts}\n"));
    }
    out
}

/// Server-side rows for one closed gameweek, in ranking order.
pub fn history_rows(rows: &[(&str, f64)]) -> Value {
    Value::Array(
        rows.iter()
            .map(|(name, pts)| {
                json!({
                    "manager_name": name,
                    "team_name": format!("{name} FC"),
                    "total_points": pts,
                    "total_points_applied": pts,
                    "captain_player": "Salah"
                })
            })
            .collect(),
    )
}

/// The aggregated result of [`csv`] for `gameweek`.
pub fn period_result(gameweek: u32, rows: &[(&str, f64)]) -> PeriodResult {
    aggregator::aggregate(&parser::parse_rows(&csv(rows)).records, gameweek)
}

pub fn memory_cache(schema: u32) -> (Arc<MemoryBackend>, CacheStore) {
    let backend = Arc::new(MemoryBackend::unbounded());
    let store = CacheStore::new(backend.clone(), schema);
    (backend, store)
}

/// Seeds `store` with gameweek `gw` under `hash`.
pub async fn seed(store: &CacheStore, gw: u32, hash: &str, rows: &[(&str, f64)]) {
    let entry = CacheEntry::new(&period_result(gw, rows), hash, store.schema_version());
    assert!(store.set(&entry).await, "seeding gameweek {gw} failed");
}

/// Parks the next call until released.
struct Hold {
    entered: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// Test side of a [`Hold`].
pub struct HoldHandle {
    entered: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl HoldHandle {
    /// Resolves once the held call has started.
    pub async fn entered(&mut self) {
        let _ = (&mut self.entered).await;
    }

    pub fn release(self) {
        let _ = self.release.send(());
    }
}

fn hold_pair() -> (Hold, HoldHandle) {
    let (entered_tx, entered_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel();
    (
        Hold {
            entered: entered_tx,
            release: release_rx,
        },
        HoldHandle {
            entered: entered_rx,
            release: release_tx,
        },
    )
}

async fn wait_on(slot: &Mutex<Option<Hold>>) {
    let hold = slot.lock().unwrap().take();
    if let Some(hold) = hold {
        let _ = hold.entered.send(());
        let _ = hold.release.await;
    }
}

#[derive(Debug, Default)]
pub struct Calls {
    pub manifest: AtomicUsize,
    pub period: AtomicUsize,
    pub history: AtomicUsize,
    pub status: AtomicUsize,
    pub fixtures: AtomicUsize,
    pub chips: AtomicUsize,
}

impl Calls {
    pub fn manifest(&self) -> usize {
        self.manifest.load(Ordering::SeqCst)
    }
    pub fn period(&self) -> usize {
        self.period.load(Ordering::SeqCst)
    }
    pub fn history(&self) -> usize {
        self.history.load(Ordering::SeqCst)
    }
    pub fn fixtures(&self) -> usize {
        self.fixtures.load(Ordering::SeqCst)
    }
    pub fn chips(&self) -> usize {
        self.chips.load(Ordering::SeqCst)
    }
}

/// In-memory upstream whose contents tests change between cycles.
#[derive(Default)]
pub struct ScriptedSource {
    manifest: Mutex<Vec<(u32, String)>>,
    periods: Mutex<HashMap<u32, String>>,
    history: Mutex<HashMap<u32, Value>>,
    /// `None` answers with a server error.
    fixtures: Mutex<Option<FixtureData>>,
    chips: Mutex<Option<Vec<Value>>>,
    pub calls: Calls,
    /// Gameweeks requested by each history call.
    pub history_requests: Mutex<Vec<Vec<u32>>>,
    /// Gameweeks requested by each period call.
    pub period_requests: Mutex<Vec<u32>>,
    fail_manifest: AtomicBool,
    fail_period: AtomicBool,
    fail_history: AtomicBool,
    period_hold: Mutex<Option<Hold>>,
    history_hold: Mutex<Option<Hold>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_manifest(&self, pairs: &[(u32, &str)]) {
        *self.manifest.lock().unwrap() = pairs.iter().map(|(gw, h)| (*gw, h.to_string())).collect();
    }

    pub fn set_period(&self, gw: u32, rows: &[(&str, f64)]) {
        self.periods.lock().unwrap().insert(gw, csv(rows));
    }

    pub fn set_period_text(&self, gw: u32, text: &str) {
        self.periods.lock().unwrap().insert(gw, text.to_string());
    }

    pub fn set_history(&self, gw: u32, rows: &[(&str, f64)]) {
        self.history.lock().unwrap().insert(gw, history_rows(rows));
    }

    pub fn set_fixtures(&self, fixtures: Option<FixtureData>) {
        *self.fixtures.lock().unwrap() = fixtures;
    }

    pub fn set_chips(&self, chips: Option<Vec<Value>>) {
        *self.chips.lock().unwrap() = chips;
    }

    pub fn fail_manifest(&self, on: bool) {
        self.fail_manifest.store(on, Ordering::SeqCst);
    }

    pub fn fail_period(&self, on: bool) {
        self.fail_period.store(on, Ordering::SeqCst);
    }

    pub fn fail_history(&self, on: bool) {
        self.fail_history.store(on, Ordering::SeqCst);
    }

    /// Parks the next `fetch_period` call.
    pub fn hold_next_period(&self) -> HoldHandle {
        let (hold, handle) = hold_pair();
        *self.period_hold.lock().unwrap() = Some(hold);
        handle
    }

    /// Parks the next `fetch_history` call.
    pub fn hold_next_history(&self) -> HoldHandle {
        let (hold, handle) = hold_pair();
        *self.history_hold.lock().unwrap() = Some(hold);
        handle
    }
}

#[async_trait]
impl GameweekSource for ScriptedSource {
    async fn fetch_manifest(&self) -> Result<Manifest, SyncError> {
        self.calls.manifest.fetch_add(1, Ordering::SeqCst);
        if self.fail_manifest.load(Ordering::SeqCst) {
            return Err(SyncError::Manifest("status 503 for api/manifest".into()));
        }
        let pairs = self.manifest.lock().unwrap().clone();
        if pairs.is_empty() {
            return Err(SyncError::Manifest("manifest lists no gameweeks".into()));
        }
        Ok(Manifest::from_hashes(pairs))
    }

    async fn fetch_period(&self, gameweek: u32) -> Result<String, SyncError> {
        self.calls.period.fetch_add(1, Ordering::SeqCst);
        self.period_requests.lock().unwrap().push(gameweek);
        let text = self.periods.lock().unwrap().get(&gameweek).cloned();
        wait_on(&self.period_hold).await;
        if self.fail_period.load(Ordering::SeqCst) {
            return Err(SyncError::LivePeriodFetch {
                period: gameweek,
                reason: "connection reset".into(),
            });
        }
        text.ok_or_else(|| SyncError::LivePeriodFetch {
            period: gameweek,
            reason: "status 404".into(),
        })
    }

    async fn fetch_history(&self, gameweeks: &[u32]) -> Result<HistoryBatch, SyncError> {
        self.calls.history.fetch_add(1, Ordering::SeqCst);
        self.history_requests.lock().unwrap().push(gameweeks.to_vec());
        wait_on(&self.history_hold).await;
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(SyncError::HistoricalPeriodFetch {
                periods: gameweeks.to_vec(),
                reason: "status 500".into(),
            });
        }
        let stored = self.history.lock().unwrap().clone();
        let mut table = serde_json::Map::new();
        for gw in gameweeks {
            if let Some(rows) = stored.get(gw) {
                table.insert(gw.to_string(), rows.clone());
            }
        }
        HistoryBatch::from_json(&json!({ "gameweeks": table }))
    }

    async fn fetch_status(&self) -> Result<PeriodStatus, SyncError> {
        self.calls.status.fetch_add(1, Ordering::SeqCst);
        let latest = self.manifest.lock().unwrap().iter().map(|(gw, _)| *gw).max();
        Ok(PeriodStatus {
            gameweek: latest,
            finished: false,
            ..Default::default()
        })
    }

    async fn fetch_fixtures(&self) -> Result<FixtureData, SyncError> {
        self.calls.fixtures.fetch_add(1, Ordering::SeqCst);
        self.fixtures.lock().unwrap().clone().ok_or_else(|| unavailable("api/fixtures"))
    }

    async fn fetch_chips(&self) -> Result<Vec<Value>, SyncError> {
        self.calls.chips.fetch_add(1, Ordering::SeqCst);
        self.chips.lock().unwrap().clone().ok_or_else(|| unavailable("api/chips"))
    }
}

fn unavailable(path: &str) -> SyncError {
    SyncError::Retrieve(RetrieveError::Status {
        status: 500,
        path: path.to_string(),
        body: "upstream unavailable".into(),
    })
}
