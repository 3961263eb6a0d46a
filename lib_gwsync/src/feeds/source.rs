//! # Gameweek Source
//!
//! The seam between the orchestrator and the network. The orchestrator only
//! ever talks to a [`GameweekSource`]; production uses
//! [`super::HttpGameweekSource`], tests use scripted in-memory sources.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::aggregator;
use crate::error::SyncError;
use crate::feeds::manifest::Manifest;
use crate::model::{ParticipantPeriodStat, PeriodOrigin, PeriodResult};

/// Remote reads the engine needs.
#[async_trait]
pub trait GameweekSource: Send + Sync {
    /// The current manifest. Any failure is [`SyncError::Manifest`].
    async fn fetch_manifest(&self) -> Result<Manifest, SyncError>;

    /// Raw CSV text for one gameweek.
    async fn fetch_period(&self, gameweek: u32) -> Result<String, SyncError>;

    /// Pre-aggregated tables for the requested closed gameweeks, in one
    /// request. Gameweeks the server leaves out are simply absent.
    async fn fetch_history(&self, gameweeks: &[u32]) -> Result<HistoryBatch, SyncError>;

    /// Status of the current gameweek.
    async fn fetch_status(&self) -> Result<PeriodStatus, SyncError>;

    /// Season fixtures with the team lookups served next to them.
    async fn fetch_fixtures(&self) -> Result<FixtureData, SyncError>;

    /// Chip usage rows, passed through as the server sends them.
    async fn fetch_chips(&self) -> Result<Vec<Value>, SyncError>;
}

/// Fixture list plus the lookups used to place players on their clubs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FixtureData {
    /// Upstream fixture objects, untouched.
    pub fixtures: Vec<Value>,
    /// Team id -> short name.
    pub team_map: BTreeMap<String, String>,
    /// Player name (several spellings) -> team short name.
    pub player_team_map: BTreeMap<String, String>,
}

/// `{ chips: [...] }` wrapper of the chips endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ChipsPayload {
    pub(crate) chips: Vec<Value>,
}

/// The next deadline, as reported alongside the gameweek status.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NextDeadline {
    /// Gameweek id.
    pub id: Option<u32>,
    /// Display name, e.g. `Gameweek 12`.
    pub name: Option<String>,
    /// ISO-8601 deadline.
    pub deadline_time: Option<String>,
}

/// Whether the current gameweek is finished, plus whatever else the server
/// reports.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodStatus {
    /// Current gameweek number.
    #[serde(alias = "current_gameweek", alias = "period")]
    pub gameweek: Option<u32>,
    /// `true` once every fixture of the gameweek is over.
    #[serde(alias = "is_finished")]
    pub finished: bool,
    /// Upcoming deadline, if announced.
    pub next_gameweek: Option<NextDeadline>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Server-aggregated tables for closed gameweeks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoryBatch {
    /// Gameweek -> managers, in the server's ranking order.
    pub periods: BTreeMap<u32, Vec<ParticipantPeriodStat>>,
}

impl HistoryBatch {
    /// Decodes `{ periods|gameweeks: { "<n>": [...] } }`. A gameweek whose
    /// list cannot be decoded is dropped with a warning.
    pub fn from_json(value: &Value) -> Result<Self, SyncError> {
        let table = value
            .get("periods")
            .or_else(|| value.get("gameweeks"))
            .and_then(Value::as_object)
            .ok_or_else(|| SyncError::HistoricalPeriodFetch {
                periods: Vec::new(),
                reason: "missing 'periods' object".into(),
            })?;

        let mut periods = BTreeMap::new();
        for (key, rows) in table {
            let Ok(gw) = key.trim().parse::<u32>() else {
                log::warn!("History batch: skipping non-numeric gameweek key '{}'", key);
                continue;
            };
            match serde_json::from_value::<Vec<ParticipantPeriodStat>>(rows.clone()) {
                Ok(list) => {
                    periods.insert(gw, list);
                }
                Err(e) => log::warn!("History batch: gameweek {} undecodable: {}", gw, e),
            }
        }
        Ok(Self { periods })
    }

    /// Takes one gameweek out of the batch as a ranked [`PeriodResult`].
    ///
    /// Rows are re-ranked on net points with the same stable sort as a
    /// fresh aggregation, so ties keep the server's order. The captain tally
    /// is rebuilt from each manager's captain.
    pub fn take(&mut self, gameweek: u32) -> Option<PeriodResult> {
        let mut participants = self.periods.remove(&gameweek)?;
        aggregator::rank(&mut participants);
        let mut captain_tally = BTreeMap::new();
        for p in participants.iter_mut() {
            p.gameweek = gameweek;
            if !p.captain_player.is_empty() {
                *captain_tally.entry(p.captain_player.clone()).or_insert(0) += 1;
            }
        }
        Some(PeriodResult {
            gameweek,
            participants,
            captain_tally,
            origin: PeriodOrigin::History,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_take_keeps_server_order_on_ties() {
        let value = json!({
            "gameweeks": {
                "3": [
                    {"manager_name": "Ann", "total_points": 70, "captain_player": "Salah"},
                    {"manager_name": "Bob", "total_points": 65, "captain_player": "Salah"}
                ],
                "x": []
            }
        });
        let mut batch = match HistoryBatch::from_json(&value) {
            Ok(b) => b,
            Err(e) => panic!("decode failed: {e}"),
        };
        let gw3 = match batch.take(3) {
            Some(r) => r,
            None => panic!("gameweek 3 missing"),
        };
        assert_eq!(gw3.origin, PeriodOrigin::History);
        assert_eq!(gw3.participants[1].rank, 2);
        assert_eq!(gw3.participants[1].gameweek, 3);
        assert_eq!(gw3.captain_tally.get("Salah"), Some(&2));
        assert!(batch.take(3).is_none());
    }

    #[test]
    fn history_take_reranks_unsorted_rows() {
        let value = json!({
            "gameweeks": {
                "4": [
                    {"manager_name": "Low", "total_points_applied": 10},
                    {"manager_name": "TieA", "total_points_applied": 50},
                    {"manager_name": "High", "total_points_applied": 90},
                    {"manager_name": "TieB", "total_points_applied": 50}
                ]
            }
        });
        let mut batch = match HistoryBatch::from_json(&value) {
            Ok(b) => b,
            Err(e) => panic!("decode failed: {e}"),
        };
        let gw4 = match batch.take(4) {
            Some(r) => r,
            None => panic!("gameweek 4 missing"),
        };
        let ranked: Vec<(&str, u32)> = gw4
            .participants
            .iter()
            .map(|p| (p.manager_name.as_str(), p.rank))
            .collect();
        assert_eq!(ranked, vec![("High", 1), ("TieA", 2), ("TieB", 3), ("Low", 4)]);
    }

    #[test]
    fn fixtures_decode_camel_case_maps() {
        let fixtures: FixtureData = serde_json::from_value(json!({
            "fixtures": [{"id": 1, "event": 12, "finished": true}],
            "teamMap": {"1": "ARS"},
            "playerTeamMap": {"Saka": "ARS"}
        }))
        .unwrap_or_default();
        assert_eq!(fixtures.fixtures.len(), 1);
        assert_eq!(fixtures.team_map.get("1").map(String::as_str), Some("ARS"));
        assert_eq!(fixtures.player_team_map.get("Saka").map(String::as_str), Some("ARS"));

        let chips: ChipsPayload = serde_json::from_value(json!({"chips": [{"name": "wildcard"}]}))
            .unwrap_or_default();
        assert_eq!(chips.chips.len(), 1);
    }

    #[test]
    fn status_keeps_unknown_fields() {
        let status: PeriodStatus = serde_json::from_value(json!({
            "current_gameweek": 12,
            "finished": false,
            "next_gameweek": {"id": 13, "name": "Gameweek 13", "deadline_time": "2025-11-22T11:00:00Z"},
            "data_checked": true
        }))
        .unwrap_or_default();
        assert_eq!(status.gameweek, Some(12));
        assert_eq!(status.next_gameweek.and_then(|n| n.id), Some(13));
        assert_eq!(status.extra.get("data_checked"), Some(&json!(true)));
    }
}
