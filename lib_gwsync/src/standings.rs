//! # Cumulative Standings
//!
//! Running totals of net points across every gameweek in the merged view,
//! with the rank each manager held one gameweek earlier.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::aggregator::normalize_name;
use crate::model::PeriodResult;

/// One manager's line in the cumulative table.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StandingRow {
    /// Normalized manager name.
    pub manager_name: String,
    /// Latest known team label.
    pub team_name: String,
    /// Upstream entry id.
    pub entry_id: i64,
    /// Sum of net points over all gameweeks.
    pub total_points: f64,
    /// Net points per gameweek.
    pub period_points: BTreeMap<u32, f64>,
    /// Current cumulative rank, 1-based.
    pub rank: u32,
    /// Rank through the previous gameweek, if there was one.
    pub previous_rank: Option<u32>,
    /// Places gained since the previous gameweek (negative when dropping).
    pub rank_change: i32,
}

/// Builds the cumulative table. Gap gameweeks contribute nothing.
pub fn compute(periods: &BTreeMap<u32, PeriodResult>) -> Vec<StandingRow> {
    let Some(&latest) = periods.keys().next_back() else {
        return Vec::new();
    };

    let mut rows: Vec<StandingRow> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (gw, result) in periods {
        for stat in &result.participants {
            let key = normalize_name(&stat.manager_name);
            let i = *index.entry(key.clone()).or_insert_with(|| {
                rows.push(StandingRow {
                    manager_name: key,
                    ..Default::default()
                });
                rows.len() - 1
            });
            let row = &mut rows[i];
            if !stat.team_name.is_empty() {
                row.team_name = stat.team_name.clone();
            }
            if stat.entry_id != 0 {
                row.entry_id = stat.entry_id;
            }
            row.total_points += stat.total_points_applied;
            row.period_points.insert(*gw, stat.total_points_applied);
        }
    }

    // Ranks through the gameweek before the latest.
    let has_previous = periods.len() > 1;
    if has_previous {
        let before: Vec<f64> = rows
            .iter()
            .map(|r| r.total_points - r.period_points.get(&latest).copied().unwrap_or(0.0))
            .collect();
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|a, b| before[*b].total_cmp(&before[*a]));
        for (pos, i) in order.into_iter().enumerate() {
            rows[i].previous_rank = Some(pos as u32 + 1);
        }
    }

    rows.sort_by(|a, b| b.total_points.total_cmp(&a.total_points));
    for (pos, row) in rows.iter_mut().enumerate() {
        row.rank = pos as u32 + 1;
        row.rank_change = row
            .previous_rank
            .map_or(0, |prev| prev as i32 - row.rank as i32);
    }
    rows
}
