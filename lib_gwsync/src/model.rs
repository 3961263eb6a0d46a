//! # Data Model
//!
//! Typed records flowing from the raw CSV payload up to the published view.
//! Field names follow the upstream CSV and JSON payloads so the same structs
//! deserialize the server's pre-aggregated history batch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sentinel player name for the per-manager summary row.
pub const TOTAL_SENTINEL: &str = "TOTAL";

/// Player status meaning the fixture is over and the player did not feature.
pub const STATUS_DID_NOT_PLAY: &str = "dnp";

/// One decoded CSV row for a gameweek.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawRecord {
    /// Manager (participant) name, as it appeared in the payload.
    pub manager_name: String,
    /// Team label.
    pub entry_team_name: String,
    /// Upstream entry id.
    pub entry_id: i64,
    /// Player name or [`TOTAL_SENTINEL`].
    pub player: String,
    /// Upstream element id of the player.
    pub element_id: i64,
    /// Positional role (GKP, DEF, ...).
    pub position: String,
    /// Club label of the player.
    pub team: String,
    /// Raw gameweek points.
    pub points_gw: f64,
    /// Points after multiplier. On the TOTAL row: the manager's net total.
    pub points_applied: f64,
    /// Squad multiplier (0 bench, 1 starter, 2+ captain).
    pub multiplier: f64,
    /// Player cost, in tenths.
    pub player_cost: f64,
    /// Captain flag.
    pub is_captain: bool,
    /// Vice-captain flag.
    pub is_vice_captain: bool,
    /// The player's fixture has kicked off.
    pub fixture_started: bool,
    /// The player's fixture is over.
    pub fixture_finished: bool,
    /// Player status (`played`, `dnp`, `in_progress`, `not_started`).
    pub status: String,
    /// TOTAL row: gross points before transfer hits.
    pub gross_points: f64,
    /// TOTAL row: points left on the bench.
    pub bench_points: f64,
    /// TOTAL row: transfer hit cost.
    pub transfer_cost: f64,
    /// TOTAL row: transfers made this gameweek.
    pub event_transfers: f64,
    /// TOTAL row: squad plus bank, in tenths.
    pub total_value: f64,
    /// TOTAL row: money in the bank, in tenths.
    pub bank: f64,
    /// TOTAL row: active chip label.
    pub active_chip: String,
}

impl RawRecord {
    /// `true` for the per-manager summary row.
    pub fn is_total(&self) -> bool {
        self.player.trim() == TOTAL_SENTINEL
    }
}

/// A squad member belonging to one manager's gameweek.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerLine {
    /// Player name.
    pub name: String,
    /// Upstream element id.
    pub element_id: i64,
    /// Positional role.
    pub position: String,
    /// Club label.
    pub team: String,
    /// Raw points.
    pub points_gw: f64,
    /// Points after multiplier.
    pub points_applied: f64,
    /// Squad multiplier.
    pub multiplier: f64,
    /// Captain flag.
    pub is_captain: bool,
    /// Vice-captain flag.
    pub is_vice_captain: bool,
    /// Fixture kicked off.
    pub fixture_started: bool,
    /// Fixture over.
    pub fixture_finished: bool,
    /// Player status.
    pub status: String,
    /// Cost in tenths.
    pub player_cost: f64,
}

/// Aggregated statistics for one manager in one gameweek.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantPeriodStat {
    /// Normalized manager name.
    pub manager_name: String,
    /// Team label.
    pub team_name: String,
    /// Upstream entry id.
    pub entry_id: i64,
    /// Gross points.
    pub total_points: f64,
    /// Net points; the ranking key.
    pub total_points_applied: f64,
    /// Bench points.
    pub bench_points: f64,
    /// Transfer hit cost.
    pub transfer_cost: f64,
    /// Transfers made.
    pub event_transfers: f64,
    /// Captain's name, empty when none was flagged.
    pub captain_player: String,
    /// Captain's raw points.
    pub captain_points: f64,
    /// Captain's fixture kicked off.
    pub captain_fixture_started: bool,
    /// Captain's fixture over.
    pub captain_fixture_finished: bool,
    /// Contributing players whose fixture is in progress.
    pub players_live: u32,
    /// Contributing players whose fixture has not started.
    pub players_upcoming: u32,
    /// Sum of squad costs, in tenths.
    pub team_value: f64,
    /// Squad plus bank, in millions.
    pub total_value: Option<f64>,
    /// Bank, in millions.
    pub bank: Option<f64>,
    /// Active chip, if any.
    pub chip_used: Option<String>,
    /// Squad in payload order.
    pub players: Vec<PlayerLine>,
    /// Whether this manager picked the gameweek's most popular captain.
    pub picked_popular_captain: bool,
    /// 1-based rank within the gameweek.
    #[serde(alias = "position")]
    pub rank: u32,
    /// Gameweek number.
    #[serde(alias = "period")]
    pub gameweek: u32,
}

/// Where a gameweek's data in the published view came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodOrigin {
    /// Freshly fetched and aggregated live gameweek.
    Live,
    /// Served from the cache store.
    Cache,
    /// From the authoritative history batch.
    History,
    /// Could not be obtained this cycle; rendered as a gap.
    Gap,
}

/// One gameweek's aggregated table plus its captain tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodResult {
    /// Gameweek number.
    pub gameweek: u32,
    /// Ranked managers.
    pub participants: Vec<ParticipantPeriodStat>,
    /// Captain name -> number of managers who picked them.
    pub captain_tally: BTreeMap<String, u32>,
    /// Provenance of this result.
    pub origin: PeriodOrigin,
}

impl PeriodResult {
    /// An empty placeholder for a gameweek that could not be fetched.
    pub fn gap(gameweek: u32) -> Self {
        Self {
            gameweek,
            participants: Vec::new(),
            captain_tally: BTreeMap::new(),
            origin: PeriodOrigin::Gap,
        }
    }

    /// `true` when no manager rows are present.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
