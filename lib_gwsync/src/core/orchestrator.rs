//! # Sync Orchestrator
//!
//! [`SyncEngine`] owns the published view and drives fetch cycles against a
//! [`GameweekSource`].
//!
//! ## One cycle
//!
//! 1. Take a new [`CycleToken`] and cancel the previous cycle's work.
//! 2. Fetch the manifest (fatal on failure) and the gameweek status
//!    (best-effort).
//! 3. Fetch and aggregate the latest gameweek, never from cache (fatal on
//!    failure).
//! 4. Look up every earlier gameweek in the cache under its manifest hash
//!    and publish a `Partial` view right away.
//! 5. In the background, fetch the cache misses in one history request
//!    (next to the fixtures and chips, both best-effort), persist them,
//!    merge with the hits and the *current* live result, and publish
//!    `Final` with cumulative standings.
//!
//! Every commit compares tokens under the state lock first. A cycle that has
//! been superseded computes its result and drops it. The lock is never held
//! across an `.await`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::aggregator;
use crate::cache::{CacheEntry, CacheStore};
use crate::core::snapshot::{CycleToken, LeagueSnapshot, SnapshotPhase};
use crate::error::SyncError;
use crate::feeds::{FixtureData, GameweekSource, Manifest, PeriodStatus};
use crate::model::{PeriodOrigin, PeriodResult};
use crate::parser;
use crate::standings;

/// Where the current cycle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Token allocated, manifest in flight.
    Started,
    /// Live gameweek fetched and aggregated.
    LiveFetched,
    /// Optimistic view published.
    PublishedPartial,
    /// Reconciled view published.
    PublishedFinal,
    /// Superseded by a newer cycle.
    Aborted,
    /// Manifest or live gameweek failed.
    Failed,
}

/// Result of trying to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Published.
    Committed,
    /// A newer cycle or refresh owns the view; result dropped.
    Stale,
    /// Cancelled before there was anything to commit.
    Cancelled,
}

/// A started cycle.
#[derive(Debug)]
pub struct CycleHandle {
    /// The cycle's token.
    pub token: CycleToken,
    /// Outcome of the optimistic commit.
    pub partial: CommitOutcome,
    /// The background reconcile, when one was started.
    pub reconcile: Option<JoinHandle<CommitOutcome>>,
}

impl CycleHandle {
    /// Waits for the background reconcile and returns the final outcome.
    pub async fn finish(self) -> CommitOutcome {
        match self.reconcile {
            Some(task) => task.await.unwrap_or(CommitOutcome::Cancelled),
            None => self.partial,
        }
    }
}

struct EngineState {
    current: CycleToken,
    cancel: CancellationToken,
    phase: Option<CyclePhase>,
    /// Bumped by every live commit so overlapping refreshes resolve in start order.
    live_seq: u64,
    snapshot: Arc<LeagueSnapshot>,
}

/// Inputs the background reconcile carries from the foreground.
struct Reconcile {
    token: CycleToken,
    cancel: CancellationToken,
    hits: BTreeMap<u32, PeriodResult>,
    /// (gameweek, manifest hash) for every miss.
    misses: Vec<(u32, String)>,
}

/// Best-effort side data fetched with the history batch. `None` keeps
/// whatever the previous view had.
struct SideData {
    fixtures: Option<FixtureData>,
    chips: Option<Vec<serde_json::Value>>,
}

/// The synchronization engine.
pub struct SyncEngine {
    source: Arc<dyn GameweekSource>,
    cache: CacheStore,
    next_token: AtomicU64,
    state: Mutex<EngineState>,
    published: watch::Sender<Arc<LeagueSnapshot>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("cache", &self.cache)
            .field("next_token", &self.next_token)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Creates an engine with an empty view.
    pub fn new(source: Arc<dyn GameweekSource>, cache: CacheStore) -> Arc<Self> {
        let snapshot = Arc::new(LeagueSnapshot::default());
        let (published, _) = watch::channel(Arc::clone(&snapshot));
        Arc::new(Self {
            source,
            cache,
            next_token: AtomicU64::new(1),
            state: Mutex::new(EngineState {
                current: CycleToken::default(),
                cancel: CancellationToken::new(),
                phase: None,
                live_seq: 0,
                snapshot,
            }),
            published,
        })
    }

    /// Follows every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<LeagueSnapshot>> {
        self.published.subscribe()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<LeagueSnapshot> {
        Arc::clone(&self.lock().snapshot)
    }

    /// The most recently started cycle.
    pub fn current_token(&self) -> CycleToken {
        self.lock().current
    }

    /// Phase of the most recently started cycle, `None` before the first.
    pub fn phase(&self) -> Option<CyclePhase> {
        self.lock().phase
    }

    /// Phase of `token`. Any cycle other than the current one is `Aborted`.
    pub fn cycle_phase(&self, token: CycleToken) -> Option<CyclePhase> {
        let state = self.lock();
        if token == state.current {
            state.phase
        } else if token < state.current {
            Some(CyclePhase::Aborted)
        } else {
            None
        }
    }

    /// The cache the engine reads and writes.
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        // state stays consistent under poisoning: mutations are plain assignments
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &mut EngineState, snapshot: LeagueSnapshot) {
        let snapshot = Arc::new(snapshot);
        state.snapshot = Arc::clone(&snapshot);
        self.published.send_replace(snapshot);
    }

    /// Sets the phase if `token` still owns the engine.
    fn advance(&self, token: CycleToken, phase: CyclePhase) -> bool {
        let mut state = self.lock();
        if state.current != token {
            return false;
        }
        state.phase = Some(phase);
        true
    }

    /// Records a fatal cycle error in the view, if `token` is still current.
    fn fail(&self, token: CycleToken, err: &SyncError) -> CommitOutcome {
        let mut state = self.lock();
        if state.current != token {
            return CommitOutcome::Stale;
        }
        state.phase = Some(CyclePhase::Failed);
        let mut next = (*state.snapshot).clone();
        next.cycle = token;
        next.error = Some(err.to_string());
        next.updated_at = Utc::now();
        self.publish(&mut state, next);
        CommitOutcome::Committed
    }

    /// Runs a full cycle up to the optimistic commit and starts the
    /// background reconcile.
    ///
    /// Returns `Err` only for a fatal error of a cycle that was still
    /// current; a superseded cycle returns a handle with a `Stale` or
    /// `Cancelled` outcome instead.
    pub async fn run_cycle(self: &Arc<Self>) -> Result<CycleHandle, SyncError> {
        // 1. New token; the previous cycle's pending work is cancelled.
        let token = CycleToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        let cancel = CancellationToken::new();
        {
            let mut state = self.lock();
            state.cancel.cancel();
            state.cancel = cancel.clone();
            state.current = token;
            state.phase = Some(CyclePhase::Started);
        }
        log::info!("Cycle {} started.", token);

        let superseded = |partial: CommitOutcome| -> Result<CycleHandle, SyncError> {
            log::debug!("Cycle {} superseded.", token);
            Ok(CycleHandle {
                token,
                partial,
                reconcile: None,
            })
        };

        // 2. Manifest and status.
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return superseded(CommitOutcome::Cancelled),
            r = async { tokio::join!(self.source.fetch_manifest(), self.source.fetch_status()) } => r,
        };
        let (manifest, status) = fetched;
        let manifest = match manifest {
            Ok(m) => m,
            Err(e) => return self.fatal(token, into_manifest_error(e)),
        };
        let status = match status {
            Ok(s) => Some(s),
            Err(e) => {
                log::warn!("Cycle {}: gameweek status unavailable: {}", token, e);
                None
            }
        };
        let Some(latest) = manifest.latest() else {
            return self.fatal(token, SyncError::Manifest("no gameweeks listed".into()));
        };

        // 3. Live gameweek, always fresh.
        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => return superseded(CommitOutcome::Cancelled),
            r = self.source.fetch_period(latest) => r,
        };
        let live = match text {
            Ok(text) => aggregator::aggregate(&parser::parse_rows(&text).records, latest),
            Err(e) => return self.fatal(token, into_live_error(latest, e)),
        };
        if !self.advance(token, CyclePhase::LiveFetched) {
            return superseded(CommitOutcome::Stale);
        }
        log::info!(
            "Cycle {}: live gameweek {} has {} managers.",
            token,
            latest,
            live.participants.len()
        );

        // 4. Closed gameweeks from the cache.
        let (hits, misses) = self.lookup_closed(&manifest, latest).await;
        log::info!(
            "Cycle {}: {} closed gameweeks cached, {} to fetch.",
            token,
            hits.len(),
            misses.len()
        );

        let partial = self.commit_partial(token, latest, live, &hits, &misses, status);
        if partial != CommitOutcome::Committed {
            return superseded(partial);
        }

        // 5. Background reconcile.
        let engine = Arc::clone(self);
        let job = Reconcile {
            token,
            cancel,
            hits,
            misses,
        };
        let reconcile = tokio::spawn(async move { engine.reconcile(job).await });

        Ok(CycleHandle {
            token,
            partial,
            reconcile: Some(reconcile),
        })
    }

    fn fatal(&self, token: CycleToken, err: SyncError) -> Result<CycleHandle, SyncError> {
        match self.fail(token, &err) {
            CommitOutcome::Committed => {
                log::error!("Cycle {} failed: {}", token, err);
                Err(err)
            }
            outcome => {
                log::debug!("Cycle {} failed after being superseded: {}", token, err);
                Ok(CycleHandle {
                    token,
                    partial: outcome,
                    reconcile: None,
                })
            }
        }
    }

    /// Splits closed gameweeks into cache hits and misses. The live gameweek
    /// is never looked up.
    async fn lookup_closed(
        &self,
        manifest: &Manifest,
        latest: u32,
    ) -> (BTreeMap<u32, PeriodResult>, Vec<(u32, String)>) {
        let mut hits = BTreeMap::new();
        let mut misses = Vec::new();
        for gw in manifest.closed_before(latest) {
            let hash = manifest.hash(gw).unwrap_or_default().to_string();
            match self.cache.get(gw, &hash).await {
                Some(entry) => {
                    hits.insert(gw, entry.into_result());
                }
                None => misses.push((gw, hash)),
            }
        }
        (hits, misses)
    }

    fn commit_partial(
        &self,
        token: CycleToken,
        latest: u32,
        live: PeriodResult,
        hits: &BTreeMap<u32, PeriodResult>,
        misses: &[(u32, String)],
        status: Option<PeriodStatus>,
    ) -> CommitOutcome {
        let mut state = self.lock();
        if state.current != token {
            return CommitOutcome::Stale;
        }

        let mut periods = hits.clone();
        // closed gameweeks already on screen stay until the reconcile replaces them
        for (gw, _) in misses {
            if let Some(shown) = state.snapshot.periods.get(gw) {
                if matches!(shown.origin, PeriodOrigin::Cache | PeriodOrigin::History) {
                    periods.insert(*gw, shown.clone());
                }
            }
        }
        periods.insert(latest, live);

        let next = LeagueSnapshot {
            cycle: token,
            phase: SnapshotPhase::Partial,
            latest_period: Some(latest),
            periods,
            status: status.or_else(|| state.snapshot.status.clone()),
            // kept until the final commit recomputes them
            standings: state.snapshot.standings.clone(),
            fixtures: state.snapshot.fixtures.clone(),
            chips: state.snapshot.chips.clone(),
            error: None,
            updated_at: Utc::now(),
        };
        state.phase = Some(CyclePhase::PublishedPartial);
        state.live_seq += 1;
        self.publish(&mut state, next);
        CommitOutcome::Committed
    }

    async fn reconcile(&self, job: Reconcile) -> CommitOutcome {
        let Reconcile {
            token,
            cancel,
            hits,
            misses,
        } = job;

        let wanted: Vec<u32> = misses.iter().map(|(gw, _)| *gw).collect();
        let history = async {
            if wanted.is_empty() {
                None
            } else {
                Some(self.source.fetch_history(&wanted).await)
            }
        };
        let (batch, fixtures, chips) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("Cycle {}: reconcile cancelled.", token);
                return CommitOutcome::Cancelled;
            }
            r = async { tokio::join!(history, self.source.fetch_fixtures(), self.source.fetch_chips()) } => r,
        };

        let side = SideData {
            fixtures: fixtures
                .map_err(|e| log::warn!("Cycle {}: fixtures unavailable: {}", token, e))
                .ok(),
            chips: chips
                .map_err(|e| log::warn!("Cycle {}: chips unavailable: {}", token, e))
                .ok(),
        };

        let mut fetched: BTreeMap<u32, PeriodResult> = BTreeMap::new();
        if let Some(batch) = batch {
            match batch {
                Ok(mut batch) => {
                    for (gw, hash) in &misses {
                        match batch.take(*gw) {
                            Some(result) if !result.is_empty() => {
                                if !hash.is_empty() {
                                    let entry =
                                        CacheEntry::new(&result, hash, self.cache.schema_version());
                                    self.cache.set(&entry).await;
                                }
                                fetched.insert(*gw, result);
                            }
                            _ => {
                                log::warn!("Cycle {}: gameweek {} missing from history.", token, gw);
                                fetched.insert(*gw, PeriodResult::gap(*gw));
                            }
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Cycle {}: {}", token, e);
                    for gw in wanted {
                        fetched.insert(gw, PeriodResult::gap(gw));
                    }
                }
            }
        }

        self.commit_final(token, hits, fetched, side)
    }

    fn commit_final(
        &self,
        token: CycleToken,
        hits: BTreeMap<u32, PeriodResult>,
        fetched: BTreeMap<u32, PeriodResult>,
        side: SideData,
    ) -> CommitOutcome {
        let mut state = self.lock();
        if state.current != token {
            log::debug!("Cycle {}: final result dropped, cycle superseded.", token);
            return CommitOutcome::Stale;
        }

        let current = Arc::clone(&state.snapshot);
        let mut periods = hits;
        periods.extend(fetched);
        // whatever live result is current now, possibly refreshed since partial
        if let Some(latest) = current.latest_period {
            if let Some(live) = current.periods.get(&latest) {
                periods.insert(latest, live.clone());
            }
        }

        let next = LeagueSnapshot {
            cycle: token,
            phase: SnapshotPhase::Final,
            latest_period: current.latest_period,
            standings: standings::compute(&periods),
            periods,
            status: current.status.clone(),
            fixtures: side.fixtures.or_else(|| current.fixtures.clone()),
            chips: side.chips.or_else(|| current.chips.clone()),
            error: None,
            updated_at: Utc::now(),
        };
        state.phase = Some(CyclePhase::PublishedFinal);
        self.publish(&mut state, next);
        log::info!("Cycle {} final.", token);
        CommitOutcome::Committed
    }

    /// Re-fetches only the live gameweek (and status) and commits it on top
    /// of the current view. History and the cache are not touched.
    ///
    /// `Stale` when no cycle has published yet, or when a newer cycle or
    /// refresh committed first.
    pub async fn refresh_live(&self) -> Result<CommitOutcome, SyncError> {
        let (token, latest, seq) = {
            let state = self.lock();
            match state.snapshot.latest_period {
                Some(latest) => (state.current, latest, state.live_seq),
                None => return Ok(CommitOutcome::Stale),
            }
        };
        log::info!("Refreshing live gameweek {}.", latest);

        let (text, status) = tokio::join!(self.source.fetch_period(latest), self.source.fetch_status());
        let text = text.map_err(|e| into_live_error(latest, e))?;
        let live = aggregator::aggregate(&parser::parse_rows(&text).records, latest);
        let status = match status {
            Ok(s) => Some(s),
            Err(e) => {
                log::warn!("Live refresh: gameweek status unavailable: {}", e);
                None
            }
        };

        let mut state = self.lock();
        if state.current != token
            || state.live_seq != seq
            || state.snapshot.latest_period != Some(latest)
        {
            log::debug!("Live refresh of gameweek {} superseded.", latest);
            return Ok(CommitOutcome::Stale);
        }

        let mut next = (*state.snapshot).clone();
        next.periods.insert(latest, live);
        if let Some(status) = status {
            next.status = Some(status);
        }
        // standings only over a reconciled view
        if next.is_final() {
            next.phase = SnapshotPhase::LiveRefresh;
            next.standings = standings::compute(&next.periods);
        }
        next.updated_at = Utc::now();
        state.live_seq += 1;
        self.publish(&mut state, next);
        Ok(CommitOutcome::Committed)
    }
}

fn into_manifest_error(e: SyncError) -> SyncError {
    match e {
        SyncError::Manifest(_) => e,
        other => SyncError::Manifest(other.to_string()),
    }
}

fn into_live_error(period: u32, e: SyncError) -> SyncError {
    match e {
        SyncError::LivePeriodFetch { .. } => e,
        other => SyncError::LivePeriodFetch {
            period,
            reason: other.to_string(),
        },
    }
}
