//! # Gameweek Aggregator
//!
//! Folds the decoded rows of one gameweek into one [`ParticipantPeriodStat`]
//! per manager, ranked by net points.
//!
//! ## Rules
//!
//! - Managers are grouped by normalized name (NBSP to space, Unicode NFC,
//!   trimmed), so visually identical names from different encoders merge.
//! - The `TOTAL` row sets the summary fields; every other row is a squad
//!   member whose cost adds to `team_value`.
//! - The first row flagged as captain wins. Later captain flags within the
//!   same manager are ignored.
//! - Only contributing players (multiplier of at least 1, status other than
//!   did-not-play) count towards `players_live` / `players_upcoming`.
//! - Ranking is a stable sort on `total_points_applied`, descending. Equal
//!   totals keep encounter order.

use std::collections::{BTreeMap, HashMap};

use unicode_normalization::UnicodeNormalization;

use crate::model::{
    ParticipantPeriodStat, PeriodOrigin, PeriodResult, PlayerLine, RawRecord, STATUS_DID_NOT_PLAY,
};

/// Canonical form of a manager name.
pub fn normalize_name(raw: &str) -> String {
    raw.replace('\u{a0}', " ")
        .nfc()
        .collect::<String>()
        .trim()
        .to_string()
}

fn did_not_play(status: &str) -> bool {
    let s = status.trim();
    s.eq_ignore_ascii_case(STATUS_DID_NOT_PLAY) || s.eq_ignore_ascii_case("did not play")
}

/// Tenths to millions, `None` unless positive.
fn money(tenths: f64) -> Option<f64> {
    (tenths > 0.0).then(|| tenths / 10.0)
}

fn chip(label: &str) -> Option<String> {
    let l = label.trim();
    if l.is_empty() || l.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(l.to_string())
    }
}

struct Group {
    stat: ParticipantPeriodStat,
    has_captain: bool,
}

/// Aggregates one gameweek. The result's origin is [`PeriodOrigin::Live`];
/// callers re-tag it when it came from somewhere else.
pub fn aggregate(records: &[RawRecord], gameweek: u32) -> PeriodResult {
    let mut groups: Vec<Group> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();
    // captain -> count, in first-pick order
    let mut picks: Vec<(String, u32)> = Vec::new();

    for rec in records {
        let name = normalize_name(&rec.manager_name);
        if name.is_empty() {
            continue;
        }

        let idx = *by_name.entry(name.clone()).or_insert_with(|| {
            groups.push(Group {
                stat: ParticipantPeriodStat {
                    manager_name: name,
                    team_name: rec.entry_team_name.trim().to_string(),
                    entry_id: rec.entry_id,
                    gameweek,
                    ..Default::default()
                },
                has_captain: false,
            });
            groups.len() - 1
        });
        let group = &mut groups[idx];
        let stat = &mut group.stat;

        if stat.team_name.is_empty() && !rec.entry_team_name.trim().is_empty() {
            stat.team_name = rec.entry_team_name.trim().to_string();
        }
        if stat.entry_id == 0 {
            stat.entry_id = rec.entry_id;
        }

        if rec.is_total() {
            stat.total_points = rec.gross_points;
            stat.total_points_applied = rec.points_applied;
            stat.bench_points = rec.bench_points;
            stat.transfer_cost = rec.transfer_cost;
            stat.event_transfers = rec.event_transfers;
            stat.total_value = money(rec.total_value);
            stat.bank = money(rec.bank);
            stat.chip_used = chip(&rec.active_chip);
            continue;
        }

        stat.team_value += rec.player_cost;

        if rec.is_captain && !group.has_captain {
            group.has_captain = true;
            stat.captain_player = rec.player.trim().to_string();
            stat.captain_points = rec.points_gw;
            stat.captain_fixture_started = rec.fixture_started;
            stat.captain_fixture_finished = rec.fixture_finished;

            match picks.iter_mut().find(|(c, _)| *c == stat.captain_player) {
                Some((_, n)) => *n += 1,
                None => picks.push((stat.captain_player.clone(), 1)),
            }
        }

        if rec.multiplier >= 1.0 && !did_not_play(&rec.status) {
            if !rec.fixture_started {
                stat.players_upcoming += 1;
            } else if !rec.fixture_finished {
                stat.players_live += 1;
            }
        }

        stat.players.push(PlayerLine {
            name: rec.player.trim().to_string(),
            element_id: rec.element_id,
            position: rec.position.clone(),
            team: rec.team.clone(),
            points_gw: rec.points_gw,
            points_applied: rec.points_applied,
            multiplier: rec.multiplier,
            is_captain: rec.is_captain,
            is_vice_captain: rec.is_vice_captain,
            fixture_started: rec.fixture_started,
            fixture_finished: rec.fixture_finished,
            status: rec.status.clone(),
            player_cost: rec.player_cost,
        });
    }

    let popular = most_picked(&picks);
    let mut participants: Vec<ParticipantPeriodStat> = groups
        .into_iter()
        .map(|g| {
            let mut stat = g.stat;
            stat.picked_popular_captain =
                g.has_captain && popular.is_some_and(|p| p == stat.captain_player);
            stat
        })
        .collect();

    rank(&mut participants);

    PeriodResult {
        gameweek,
        participants,
        captain_tally: picks.into_iter().collect::<BTreeMap<_, _>>(),
        origin: PeriodOrigin::Live,
    }
}

/// Most-picked captain; ties go to whoever was picked first.
fn most_picked(picks: &[(String, u32)]) -> Option<&str> {
    let mut best: Option<&(String, u32)> = None;
    for pick in picks {
        if best.map_or(true, |b| pick.1 > b.1) {
            best = Some(pick);
        }
    }
    best.map(|(name, _)| name.as_str())
}

/// Stable descending sort on net points, then dense 1..N ranks.
pub fn rank(participants: &mut [ParticipantPeriodStat]) {
    participants.sort_by(|a, b| b.total_points_applied.total_cmp(&a.total_points_applied));
    for (i, p) in participants.iter_mut().enumerate() {
        p.rank = i as u32 + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(manager: &str, name: &str, pts: f64, mult: f64) -> RawRecord {
        RawRecord {
            manager_name: manager.into(),
            entry_team_name: format!("{manager} FC"),
            player: name.into(),
            points_gw: pts,
            points_applied: pts * mult,
            multiplier: mult,
            player_cost: 50.0,
            status: "played".into(),
            fixture_started: true,
            fixture_finished: true,
            ..Default::default()
        }
    }

    fn total(manager: &str, net: f64) -> RawRecord {
        RawRecord {
            manager_name: manager.into(),
            player: "TOTAL".into(),
            gross_points: net + 4.0,
            points_applied: net,
            transfer_cost: 4.0,
            total_value: 1023.0,
            bank: 0.0,
            active_chip: "None".into(),
            ..Default::default()
        }
    }

    #[test]
    fn total_row_sets_summary_fields() {
        let rows = vec![player("Ann", "Salah", 10.0, 2.0), total("Ann", 60.0)];
        let result = aggregate(&rows, 7);
        let ann = &result.participants[0];
        assert_eq!(ann.total_points, 64.0);
        assert_eq!(ann.total_points_applied, 60.0);
        assert_eq!(ann.transfer_cost, 4.0);
        assert_eq!(ann.total_value, Some(102.3));
        assert_eq!(ann.bank, None);
        assert_eq!(ann.chip_used, None);
        assert_eq!(ann.team_value, 50.0);
        assert_eq!(ann.players.len(), 1);
        assert_eq!(ann.gameweek, 7);
    }

    #[test]
    fn first_captain_wins() {
        let mut a = player("Ann", "Salah", 10.0, 2.0);
        a.is_captain = true;
        let mut b = player("Ann", "Haaland", 2.0, 2.0);
        b.is_captain = true;
        let result = aggregate(&[a, b], 1);
        let ann = &result.participants[0];
        assert_eq!(ann.captain_player, "Salah");
        assert_eq!(ann.captain_points, 10.0);
        assert_eq!(result.captain_tally.get("Salah"), Some(&1));
        assert_eq!(result.captain_tally.get("Haaland"), None);
    }

    #[test]
    fn live_and_upcoming_only_count_contributors() {
        let mut live = player("Ann", "A", 1.0, 1.0);
        live.fixture_finished = false;
        let mut upcoming = player("Ann", "B", 0.0, 1.0);
        upcoming.fixture_started = false;
        upcoming.fixture_finished = false;
        let mut benched = upcoming.clone();
        benched.player = "C".into();
        benched.multiplier = 0.0;
        let mut dnp = live.clone();
        dnp.player = "D".into();
        dnp.status = "dnp".into();
        let done = player("Ann", "E", 6.0, 1.0);

        let result = aggregate(&[live, upcoming, benched, dnp, done], 1);
        let ann = &result.participants[0];
        assert_eq!(ann.players_live, 1);
        assert_eq!(ann.players_upcoming, 1);
        assert_eq!(ann.players.len(), 5);
    }

    #[test]
    fn names_are_normalized_before_grouping() {
        // "José" composed vs decomposed, plus a trailing NBSP
        let rows = vec![
            player("Jos\u{e9}", "A", 1.0, 1.0),
            player("Jose\u{301}\u{a0}", "B", 1.0, 1.0),
        ];
        let result = aggregate(&rows, 1);
        assert_eq!(result.participants.len(), 1);
        assert_eq!(result.participants[0].players.len(), 2);
    }

    #[test]
    fn ranks_are_dense_and_ties_stable() {
        let rows = vec![
            total("Cat", 50.0),
            total("Ann", 70.0),
            total("Bob", 50.0),
            total("Dan", 10.0),
        ];
        let result = aggregate(&rows, 3);
        let order: Vec<_> = result
            .participants
            .iter()
            .map(|p| (p.manager_name.as_str(), p.rank))
            .collect();
        assert_eq!(order, vec![("Ann", 1), ("Cat", 2), ("Bob", 3), ("Dan", 4)]);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let mut cap = player("Bob", "Kane", 8.0, 2.0);
        cap.is_captain = true;
        let rows = vec![cap, total("Bob", 40.0), total("Ann", 40.0)];
        let first = serde_json::to_string(&aggregate(&rows, 2)).unwrap_or_default();
        let second = serde_json::to_string(&aggregate(&rows, 2)).unwrap_or_default();
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn popular_captain_tie_goes_to_first_pick() {
        let mut rows = Vec::new();
        for (mgr, cap) in [("A", "Salah"), ("B", "Haaland"), ("C", "Haaland"), ("D", "Salah")] {
            let mut r = player(mgr, cap, 5.0, 2.0);
            r.is_captain = true;
            rows.push(r);
        }
        let result = aggregate(&rows, 1);
        let flagged: Vec<_> = result
            .participants
            .iter()
            .filter(|p| p.picked_popular_captain)
            .map(|p| p.manager_name.as_str())
            .collect();
        assert_eq!(flagged, vec!["A", "D"]);
    }

    #[test]
    fn empty_input_is_empty_result() {
        let result = aggregate(&[], 5);
        assert!(result.is_empty());
        assert!(result.captain_tally.is_empty());
    }
}
