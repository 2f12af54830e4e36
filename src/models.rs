//! Core data models for the reconciliation run.
//!
//! This module contains the record and assignment types shared by every
//! stage, plus the run statistics used for instrumentation.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Type Aliases
// ============================================================================

/// `"{title} - {artist, artist}"`, see [`crate::normalize::track_id`]
pub type TrackId = String;

/// Canonical records keyed by track identifier
pub type TrackMap = FxHashMap<TrackId, Record>;

// ============================================================================
// Canonical Records
// ============================================================================

/// Attribution of a canonical track: who added it to which playlist, when.
/// Field names match the persisted response cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub added_at: String,
    pub added_by: String,
    pub playlist: String,
}

/// One item of a playlist page as returned by the playlist service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub title: String,
    pub artists: Vec<String>,
    pub added_at: String,
    pub added_by: String,
}

// ============================================================================
// Assignments
// ============================================================================

/// How a file was paired with its record.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum MatchMethod {
    /// File key equals the track identifier
    Exact,
    /// Best candidate above the threshold in this run
    Fuzzy {
        fuzz_ratio: f64,
        #[serde(rename = "match")]
        matched: TrackId,
    },
    /// Accepted in a previous run and replayed from the decision cache
    Cached {
        #[serde(rename = "match")]
        matched: TrackId,
    },
}

impl MatchMethod {
    pub fn fuzz_ratio(&self) -> Option<f64> {
        match self {
            MatchMethod::Fuzzy { fuzz_ratio, .. } => Some(*fuzz_ratio),
            _ => None,
        }
    }

    /// Identifier the file was matched to, when it differs from the file key.
    pub fn matched(&self) -> Option<&str> {
        match self {
            MatchMethod::Exact => None,
            MatchMethod::Fuzzy { matched, .. } | MatchMethod::Cached { matched } => {
                Some(matched.as_str())
            }
        }
    }
}

/// A local file paired with a copy of its canonical record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Assignment {
    /// Inventory path relative to the music root
    pub file: String,
    /// Matching key derived from `file`
    pub key: String,
    pub record: Record,
    #[serde(flatten)]
    pub method: MatchMethod,
}

impl Assignment {
    /// Track identifier of the assigned record.
    pub fn track_id(&self) -> &str {
        self.method.matched().unwrap_or(&self.key)
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Per-stage counts for one run. Logged as JSON at the end and optionally
/// written to a file so successive threshold sweeps can be compared.
#[derive(Default, Debug, Clone, Serialize)]
pub struct RunStats {
    // Sources
    pub canonical_tracks: usize,
    pub duplicate_track_ids: usize,
    pub inventory_files: usize,
    pub local_files: usize,

    // Correction layer
    pub renamed_files: usize,
    pub excluded_files: usize,
    pub already_placed: usize,

    // Matching
    pub direct_matches: usize,
    pub cached_matches: usize,
    pub stale_cache_entries: usize,
    pub skipped_files: usize,
    pub fuzzy_candidates: usize,
    pub fuzzy_matches: usize,
    pub contested_records: usize,
    pub unmatched: usize,
    pub similarity_computations: u64,

    // Placement
    pub moves_planned: usize,
    pub moves_executed: usize,
    pub moves_failed: usize,
    pub placements_skipped: usize,

    // Timing
    pub elapsed_seconds: f64,
}

impl RunStats {
    pub fn total_matches(&self) -> usize {
        self.direct_matches + self.cached_matches + self.fuzzy_matches
    }

    /// Share of considered files that ended up with an assignment, in percent
    pub fn match_rate(&self) -> f64 {
        let considered = self.total_matches() + self.unmatched;
        if considered == 0 {
            0.0
        } else {
            100.0 * self.total_matches() as f64 / considered as f64
        }
    }

    /// Log stats in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            tracing::info!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
