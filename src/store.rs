//! In-memory record store keyed by track identifier.
//!
//! Built once per run from the canonical playlists. The exact matcher retires
//! entries as it pairs them; the decision cache narrows the candidate set
//! handed to the fuzzy matcher.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::models::{PlaylistEntry, Record, TrackId, TrackMap};
use crate::normalize::track_id;

/// A track identifier seen more than once while building the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collision {
    pub track_id: TrackId,
    pub kept_playlist: String,
    pub dropped_playlist: String,
}

#[derive(Clone, Debug, Default)]
pub struct RecordStore {
    tracks: TrackMap,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(tracks: TrackMap) -> Self {
        Self { tracks }
    }

    /// Flatten one playlist into the store. A later entry with an identifier
    /// already present overwrites the earlier attribution (last-seen wins);
    /// every overwrite is returned so the caller can report it.
    pub fn insert_playlist(&mut self, playlist: &str, entries: &[PlaylistEntry]) -> Vec<Collision> {
        let mut collisions = Vec::new();
        for entry in entries {
            let id = track_id(&entry.title, &entry.artists);
            let record = Record {
                added_at: entry.added_at.clone(),
                added_by: entry.added_by.clone(),
                playlist: playlist.to_string(),
            };
            if let Some(previous) = self.tracks.insert(id.clone(), record) {
                warn!(
                    "Duplicate track \"{}\": \"{}\" overrides \"{}\"",
                    id, playlist, previous.playlist
                );
                collisions.push(Collision {
                    track_id: id,
                    kept_playlist: playlist.to_string(),
                    dropped_playlist: previous.playlist,
                });
            }
        }
        collisions
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.tracks.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Record> {
        self.tracks.remove(id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TrackId, &Record)> {
        self.tracks.iter()
    }

    /// Track identifiers in lexicographic order.
    pub fn sorted_ids(&self) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self.tracks.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Copy of the store without the given identifiers.
    pub fn without(&self, excluded: &FxHashSet<&str>) -> RecordStore {
        let tracks = self
            .tracks
            .iter()
            .filter(|(id, _)| !excluded.contains(id.as_str()))
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();
        RecordStore { tracks }
    }

    pub fn into_map(self) -> TrackMap {
        self.tracks
    }
}

// ============================================================================
// Contribution Analysis
// ============================================================================

/// How many tracks one user contributed to each playlist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserContribution {
    pub user_id: String,
    /// Folder name from the `users` table, if the user is known
    pub user_name: Option<String>,
    pub playlists: BTreeMap<String, usize>,
}

impl UserContribution {
    pub fn total(&self) -> usize {
        self.playlists.values().sum()
    }
}

/// Group records by contributing user, then by playlist. Sorted by user id.
pub fn contributions(
    store: &RecordStore,
    users: &FxHashMap<String, String>,
) -> Vec<UserContribution> {
    let mut by_user: BTreeMap<&str, BTreeMap<String, usize>> = BTreeMap::new();
    for (_, record) in store.iter() {
        *by_user
            .entry(record.added_by.as_str())
            .or_default()
            .entry(record.playlist.clone())
            .or_default() += 1;
    }
    by_user
        .into_iter()
        .map(|(user_id, playlists)| UserContribution {
            user_id: user_id.to_string(),
            user_name: users.get(user_id).cloned(),
            playlists,
        })
        .collect()
}

/// Report lines: `"<name> (<id>): <n> tracks"` per user, then one
/// indented `"<playlist>: <n>"` line per playlist.
pub fn contribution_lines(report: &[UserContribution]) -> Vec<String> {
    let mut lines = Vec::new();
    for user in report {
        lines.push(format!(
            "{} ({}): {} tracks",
            user.user_name.as_deref().unwrap_or("?"),
            user.user_id,
            user.total()
        ));
        for (playlist, count) in &user.playlists {
            lines.push(format!("\t{}: {}", playlist, count));
        }
    }
    lines
}

/// Logged on every run, independent of verbosity.
pub fn log_contributions(report: &[UserContribution]) {
    info!("User contributions:");
    for line in contribution_lines(report) {
        info!("{}", line);
    }
}
