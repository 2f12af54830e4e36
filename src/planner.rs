//! Placement planning: where each matched file belongs.
//!
//! The layout is `<music_root>/<user>/<genre>/old/<file name>`, with the user
//! folder taken from the contributing user and the genre from the playlist.

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::fsops::MoveExecutor;
use crate::models::Assignment;
use crate::normalize::file_name;

/// Leaf folder every reorganized file lands in.
pub const ARCHIVE_DIR: &str = "old";

/// Split off files that already live under a user folder. They are treated
/// as correctly placed and never matched.
pub fn split_already_placed(files: Vec<String>, user_prefixes: &[String]) -> (Vec<String>, Vec<String>) {
    let (placed, kept): (Vec<String>, Vec<String>) = files
        .into_iter()
        .partition(|file| user_prefixes.iter().any(|prefix| file.starts_with(prefix.as_str())));
    info!("Ignoring {} files that are already in the right place", placed.len());
    (kept, placed)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedMove {
    /// Inventory path of the file
    pub file: String,
    pub user: String,
    pub genre: String,
    pub from: PathBuf,
    pub dest_dir: PathBuf,
    pub to: PathBuf,
}

/// An assignment that cannot be placed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlacementSkip {
    UnknownUser { file: String, user_id: String },
    UnknownGenre { file: String, playlist: String },
}

#[derive(Clone, Debug, Default)]
pub struct Plan {
    pub moves: Vec<PlannedMove>,
    pub skipped: Vec<PlacementSkip>,
}

pub struct Planner<'a> {
    music_root: &'a Path,
    users: &'a FxHashMap<String, String>,
    playlist_genres: &'a FxHashMap<String, String>,
}

impl<'a> Planner<'a> {
    pub fn new(
        music_root: &'a Path,
        users: &'a FxHashMap<String, String>,
        playlist_genres: &'a FxHashMap<String, String>,
    ) -> Self {
        Self {
            music_root,
            users,
            playlist_genres,
        }
    }

    /// `<music_root>/<user>/<genre>/old`
    pub fn destination_dir(&self, user: &str, genre: &str) -> PathBuf {
        self.music_root.join(user).join(genre).join(ARCHIVE_DIR)
    }

    pub fn plan(&self, assignments: &[Assignment]) -> Plan {
        let mut plan = Plan::default();
        for assignment in assignments {
            let record = &assignment.record;
            let Some(user) = self.users.get(&record.added_by) else {
                warn!("Unknown user \"{}\" for \"{}\"", record.added_by, assignment.file);
                plan.skipped.push(PlacementSkip::UnknownUser {
                    file: assignment.file.clone(),
                    user_id: record.added_by.clone(),
                });
                continue;
            };
            let Some(genre) = self.playlist_genres.get(&record.playlist) else {
                warn!("No genre for playlist \"{}\" (\"{}\")", record.playlist, assignment.file);
                plan.skipped.push(PlacementSkip::UnknownGenre {
                    file: assignment.file.clone(),
                    playlist: record.playlist.clone(),
                });
                continue;
            };
            let dest_dir = self.destination_dir(user, genre);
            plan.moves.push(PlannedMove {
                file: assignment.file.clone(),
                user: user.clone(),
                genre: genre.clone(),
                from: self.music_root.join(&assignment.file),
                to: dest_dir.join(file_name(&assignment.file)),
                dest_dir,
            });
        }
        plan
    }
}

// ============================================================================
// Execution
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveFailure {
    pub file: String,
    pub error: String,
}

#[derive(Clone, Debug, Default)]
pub struct MoveReport {
    pub executed: usize,
    pub failures: Vec<MoveFailure>,
}

/// Carry out a plan. A failing move is recorded and the next one is tried;
/// nothing computed before this point is touched.
pub fn execute(plan: &Plan, executor: &dyn MoveExecutor) -> MoveReport {
    let mut report = MoveReport::default();
    for mv in &plan.moves {
        let result = executor
            .ensure_dir(&mv.dest_dir)
            .and_then(|_| executor.rename(&mv.from, &mv.to));
        match result {
            Ok(()) => report.executed += 1,
            Err(e) => {
                warn!("Failed to move \"{}\": {}", mv.file, e);
                report.failures.push(MoveFailure {
                    file: mv.file.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    info!(
        "{} {} files ({} failed)",
        if executor.is_commit() { "Moved" } else { "Would move" },
        report.executed,
        report.failures.len()
    );
    report
}
