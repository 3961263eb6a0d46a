//! # Published Snapshot
//!
//! The read-only view the engine publishes after each commit. Consumers get
//! it as an `Arc` from a `watch` channel and never see a half-applied state.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::feeds::{FixtureData, PeriodStatus};
use crate::model::{PeriodOrigin, PeriodResult};
use crate::standings::StandingRow;

/// Identifies one sync cycle. Strictly increasing per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct CycleToken(pub u64);

impl fmt::Display for CycleToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the last commit was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPhase {
    /// Nothing committed yet.
    Empty,
    /// Fresh live gameweek plus cache hits; history still reconciling.
    Partial,
    /// Complete merged view with standings.
    Final,
    /// Live gameweek refreshed on top of a final view.
    LiveRefresh,
}

/// The merged view.
#[derive(Debug, Clone, Serialize)]
pub struct LeagueSnapshot {
    /// Cycle that produced this view.
    pub cycle: CycleToken,
    /// Commit kind.
    pub phase: SnapshotPhase,
    /// The live gameweek.
    pub latest_period: Option<u32>,
    /// Every gameweek known to this view.
    pub periods: BTreeMap<u32, PeriodResult>,
    /// Last known status of the live gameweek.
    pub status: Option<PeriodStatus>,
    /// Cumulative table, recomputed on final and live-refresh commits.
    pub standings: Vec<StandingRow>,
    /// Fixtures from the last reconcile that got them.
    pub fixtures: Option<FixtureData>,
    /// Chip usage from the last reconcile that got it.
    pub chips: Option<Vec<Value>>,
    /// Last fatal cycle error, cleared by the next successful commit.
    pub error: Option<String>,
    /// Time of the commit.
    pub updated_at: DateTime<Utc>,
}

impl Default for LeagueSnapshot {
    fn default() -> Self {
        Self {
            cycle: CycleToken::default(),
            phase: SnapshotPhase::Empty,
            latest_period: None,
            periods: BTreeMap::new(),
            status: None,
            standings: Vec::new(),
            fixtures: None,
            chips: None,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

impl LeagueSnapshot {
    /// Result for one gameweek.
    pub fn period(&self, gameweek: u32) -> Option<&PeriodResult> {
        self.periods.get(&gameweek)
    }

    /// Gameweeks rendered as gaps.
    pub fn gaps(&self) -> Vec<u32> {
        self.periods
            .values()
            .filter(|r| r.origin == PeriodOrigin::Gap)
            .map(|r| r.gameweek)
            .collect()
    }

    /// `true` once the history for this cycle has been reconciled.
    pub fn is_final(&self) -> bool {
        matches!(self.phase, SnapshotPhase::Final | SnapshotPhase::LiveRefresh)
    }
}
