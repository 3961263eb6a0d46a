//! # Raw Row Parser
//!
//! Decodes the CSV payload for one gameweek into [`RawRecord`]s, in input
//! order. All field coercion lives here, behind two total functions:
//!
//! - [`coerce_number`]: anything that is not a finite number reads as `0`.
//! - [`coerce_bool`]: `true` (any case), `1` and `1.0` read as `true`,
//!   everything else as `false`.
//!
//! A row that cannot be decoded is skipped and logged; it never fails the
//! whole payload.

use std::collections::HashMap;

use csv::{ReaderBuilder, StringRecord};
use thiserror::Error;

use crate::model::RawRecord;

/// Body the upstream publishes while it is rewriting a gameweek file.
pub const UPDATING_PLACEHOLDER: &str = "The game is being updated.";

/// A single rejected row.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("row {line}: {reason}")]
pub struct ParseError {
    /// 1-based line number in the payload, when known.
    pub line: u64,
    /// What was wrong with it.
    pub reason: String,
}

/// Result of parsing one payload.
#[derive(Debug, Default)]
pub struct ParsedTable {
    /// Accepted rows, in input order.
    pub records: Vec<RawRecord>,
    /// Rows that were skipped because they could not be decoded.
    pub rejected: Vec<ParseError>,
}

/// Numeric coercion. Empty, non-numeric and non-finite input yields `0.0`.
pub fn coerce_number(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Boolean coercion. Truthy tokens: `true` (case-insensitive), `1`, `1.0`.
pub fn coerce_bool(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        return true;
    }
    matches!(trimmed.parse::<f64>(), Ok(v) if v == 1.0)
}

/// Column lookup by header name, with fallbacks for renamed columns.
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_string(), i))
            .collect();
        Self { index }
    }

    fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// First present column among `names`, empty when none is.
    fn get<'r>(&self, row: &'r StringRecord, names: &[&str]) -> &'r str {
        names
            .iter()
            .find_map(|n| self.index.get(*n))
            .and_then(|i| row.get(*i))
            .unwrap_or("")
    }
}

/// Parses one gameweek payload.
pub fn parse_rows(text: &str) -> ParsedTable {
    let mut table = ParsedTable::default();
    let body = text.trim();
    if body.is_empty() || body == UPDATING_PLACEHOLDER {
        return table;
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(body.as_bytes());

    let columns = match reader.headers() {
        Ok(headers) => Columns::new(headers),
        Err(e) => {
            log::warn!("Unreadable CSV header, treating payload as empty: {}", e);
            return table;
        }
    };
    let gross_present = columns.has("gross_points");

    for (idx, result) in reader.records().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(idx as u64 + 2);
                let err = ParseError { line, reason: e.to_string() };
                log::warn!("Skipping malformed row: {}", err);
                table.rejected.push(err);
                continue;
            }
        };

        let manager_name = columns.get(&row, &["manager_name"]).to_string();
        if manager_name.trim().is_empty() {
            continue;
        }

        let points_applied = coerce_number(columns.get(&row, &["points_applied"]));
        let gross_points = if gross_present {
            coerce_number(columns.get(&row, &["gross_points"]))
        } else {
            points_applied
        };

        table.records.push(RawRecord {
            manager_name,
            entry_team_name: columns.get(&row, &["entry_team_name", "team_name"]).to_string(),
            entry_id: coerce_number(columns.get(&row, &["entry_id"])) as i64,
            player: columns.get(&row, &["player"]).to_string(),
            element_id: coerce_number(columns.get(&row, &["element_id"])) as i64,
            position: columns.get(&row, &["position", "position_role"]).to_string(),
            team: columns.get(&row, &["team", "club"]).to_string(),
            points_gw: coerce_number(columns.get(&row, &["points_gw"])),
            points_applied,
            multiplier: coerce_number(columns.get(&row, &["multiplier"])),
            player_cost: coerce_number(columns.get(&row, &["player_cost"])),
            is_captain: coerce_bool(columns.get(&row, &["is_captain"])),
            is_vice_captain: coerce_bool(columns.get(&row, &["is_vice_captain"])),
            fixture_started: coerce_bool(columns.get(&row, &["fixture_started"])),
            fixture_finished: coerce_bool(columns.get(&row, &["fixture_finished"])),
            status: columns.get(&row, &["status"]).trim().to_string(),
            gross_points,
            bench_points: coerce_number(columns.get(&row, &["bench_points"])),
            transfer_cost: coerce_number(columns.get(&row, &["transfer_cost"])),
            event_transfers: coerce_number(columns.get(&row, &["event_transfers"])),
            total_value: coerce_number(columns.get(&row, &["total_value"])),
            bank: coerce_number(columns.get(&row, &["bank"])),
            active_chip: columns.get(&row, &["active_chip"]).trim().to_string(),
        });
    }

    if !table.rejected.is_empty() {
        log::warn!(
            "Parsed {} rows, rejected {}",
            table.records.len(),
            table.rejected.len()
        );
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "manager_name,entry_team_name,player,points_gw,points_applied,multiplier,is_captain,fixture_started,fixture_finished,status,player_cost";

    #[test]
    fn numbers_default_to_zero() {
        assert_eq!(coerce_number(""), 0.0);
        assert_eq!(coerce_number("  "), 0.0);
        assert_eq!(coerce_number("abc"), 0.0);
        assert_eq!(coerce_number("NaN"), 0.0);
        assert_eq!(coerce_number("inf"), 0.0);
        assert_eq!(coerce_number(" 12 "), 12.0);
        assert_eq!(coerce_number("4.5"), 4.5);
        assert_eq!(coerce_number("-4"), -4.0);
    }

    #[test]
    fn truthy_tokens() {
        for t in ["true", "True", "TRUE", "1", "1.0", " true "] {
            assert!(coerce_bool(t), "{t} should be truthy");
        }
        for f in ["false", "False", "0", "", "yes", "2", "None"] {
            assert!(!coerce_bool(f), "{f} should be falsy");
        }
    }

    #[test]
    fn keeps_order_and_drops_nameless_rows() {
        let text = format!(
            "{HEADER}\nAlice,A FC,Salah,10,20,2,True,True,False,in_progress,130\n,Nobody,Kane,5,5,1,False,True,True,played,110\nBob,B FC,TOTAL,,42,,,,,,\n"
        );
        let parsed = parse_rows(&text);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].manager_name, "Alice");
        assert!(parsed.records[0].is_captain);
        assert!(parsed.records[0].fixture_started);
        assert!(!parsed.records[0].fixture_finished);
        assert_eq!(parsed.records[0].points_applied, 20.0);
        assert!(parsed.records[1].is_total());
        // no gross_points column: gross falls back to points_applied
        assert_eq!(parsed.records[1].gross_points, 42.0);
        assert!(parsed.rejected.is_empty());
    }

    #[test]
    fn malformed_row_is_skipped_not_fatal() {
        let text = format!(
            "{HEADER}\nAlice,A FC,Salah,10,20,2,True,True,False,in_progress,130\nBroken,row\nBob,B FC,Haaland,8,8,1,False,False,False,not_started,140\n"
        );
        let parsed = parse_rows(&text);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[1].manager_name, "Bob");
        assert_eq!(parsed.rejected.len(), 1);
    }

    #[test]
    fn placeholder_and_blank_bodies_are_empty() {
        assert!(parse_rows("").records.is_empty());
        assert!(parse_rows("  \n").records.is_empty());
        assert!(parse_rows(UPDATING_PLACEHOLDER).records.is_empty());
    }
}
