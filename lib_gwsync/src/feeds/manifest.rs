//! # Manifest
//!
//! The list of known gameweeks and the content hash of each one's data file.
//! A fresh manifest is fetched at the start of every cycle and never stored.
//!
//! ## Accepted shapes
//!
//! ```json
//! { "periods":   { "1": { "hash": "a1", "updated": "..." }, "2": { "hash": "b2" } } }
//! { "gameweeks": { "1": { "hash": "a1" } } }
//! { "periods":   { "1": "a1" } }
//! ```
//!
//! Keys that are not gameweek numbers are skipped with a warning. Extra
//! fields on an entry are kept as metadata.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::SyncError;

/// One gameweek's manifest entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManifestEntry {
    /// Content hash of the gameweek's data file. Empty when the server did
    /// not provide one, in which case the gameweek is never cached.
    pub hash: String,
    /// Any other fields the server sent.
    pub metadata: Map<String, Value>,
}

/// Gameweek -> entry, ordered by gameweek.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Manifest {
    entries: BTreeMap<u32, ManifestEntry>,
}

impl Manifest {
    /// Builds a manifest from `(gameweek, hash)` pairs.
    pub fn from_hashes<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .map(|(gw, hash)| {
                (
                    gw,
                    ManifestEntry {
                        hash: hash.into(),
                        metadata: Map::new(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Decodes the server's JSON. An empty manifest is an error.
    pub fn from_json(value: &Value) -> Result<Self, SyncError> {
        let table = value
            .get("periods")
            .or_else(|| value.get("gameweeks"))
            .and_then(Value::as_object)
            .ok_or_else(|| SyncError::Manifest("missing 'periods' object".into()))?;

        let mut entries = BTreeMap::new();
        for (key, raw) in table {
            let Ok(gw) = key.trim().parse::<u32>() else {
                log::warn!("Manifest: skipping non-numeric gameweek key '{}'", key);
                continue;
            };
            let entry = match raw {
                Value::String(hash) => ManifestEntry {
                    hash: hash.clone(),
                    metadata: Map::new(),
                },
                Value::Object(fields) => {
                    let mut metadata = fields.clone();
                    let hash = match metadata.remove("hash") {
                        Some(Value::String(h)) => h,
                        Some(Value::Number(n)) => n.to_string(),
                        _ => String::new(),
                    };
                    ManifestEntry { hash, metadata }
                }
                _ => ManifestEntry::default(),
            };
            if entry.hash.is_empty() {
                log::warn!("Manifest: gameweek {} has no content hash", gw);
            }
            entries.insert(gw, entry);
        }

        if entries.is_empty() {
            return Err(SyncError::Manifest("no gameweeks listed".into()));
        }
        Ok(Self { entries })
    }

    /// The most recent gameweek.
    pub fn latest(&self) -> Option<u32> {
        self.entries.keys().next_back().copied()
    }

    /// Content hash for `gameweek`, if listed.
    pub fn hash(&self, gameweek: u32) -> Option<&str> {
        self.entries.get(&gameweek).map(|e| e.hash.as_str())
    }

    /// The entry for `gameweek`, if listed.
    pub fn entry(&self, gameweek: u32) -> Option<&ManifestEntry> {
        self.entries.get(&gameweek)
    }

    /// Listed gameweeks, ascending.
    pub fn periods(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// Listed gameweeks strictly before `gameweek`.
    pub fn closed_before(&self, gameweek: u32) -> Vec<u32> {
        self.entries.range(..gameweek).map(|(gw, _)| *gw).collect()
    }

    /// Number of listed gameweeks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is listed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
