//! Exact and fuzzy matching of local files against the record store.
//!
//! The exact pass is a pure equality lookup and always runs first so the
//! O(files × records) similarity sweep only sees what equality could not
//! resolve.

use tracing::{debug, info};

use crate::models::{Assignment, MatchMethod, TrackId};
use crate::normalize::{file_key, fold_case};
use crate::pool::WorkerPool;
use crate::progress::{Phase, PhaseProgress};
use crate::scoring::{accept, best_candidate, ratio_folded};
use crate::store::RecordStore;

// ============================================================================
// Exact Matcher
// ============================================================================

/// Output of the exact pass.
#[derive(Debug, Default)]
pub struct DirectMatches {
    pub assignments: Vec<Assignment>,
    /// Files left for the fuzzy pass, in input order
    pub residual: Vec<String>,
}

/// Pair every file whose key equals a track identifier, retiring that record.
/// A second file with the same key finds the record gone and falls through
/// to the residual list.
pub fn match_exact(files: Vec<String>, store: &mut RecordStore) -> DirectMatches {
    let mut out = DirectMatches::default();
    for file in files {
        let key = file_key(&file);
        match store.remove(&key) {
            Some(record) => out.assignments.push(Assignment {
                file,
                key,
                record,
                method: MatchMethod::Exact,
            }),
            None => out.residual.push(file),
        }
    }
    info!(
        "Found {} tracks...fuzzy searching for the remaining {}",
        out.assignments.len(),
        out.residual.len()
    );
    out
}

// ============================================================================
// Fuzzy Matcher
// ============================================================================

/// Output of the fuzzy pass.
#[derive(Debug, Default)]
pub struct FuzzyOutcome {
    pub assignments: Vec<Assignment>,
    /// Files with no candidate at or above the threshold
    pub unmatched: Vec<String>,
    /// Number of similarity scores computed
    pub computations: u64,
}

struct Candidate {
    id: TrackId,
    folded: String,
}

/// Similarity sweep over a fixed candidate set.
pub struct FuzzyMatcher<'a> {
    store: &'a RecordStore,
    /// Sorted by track identifier; lower index wins ties
    candidates: Vec<Candidate>,
    threshold: f64,
}

impl<'a> FuzzyMatcher<'a> {
    pub fn new(store: &'a RecordStore, threshold: f64) -> Self {
        let candidates = store
            .sorted_ids()
            .into_iter()
            .map(|id| Candidate {
                folded: fold_case(&id),
                id,
            })
            .collect();
        Self {
            store,
            candidates,
            threshold,
        }
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Every candidate clearing the threshold for `key`, as `(index, score)`.
    fn sweep(&self, key: &str) -> Vec<(usize, f64)> {
        let folded = fold_case(key);
        self.candidates
            .iter()
            .enumerate()
            .filter_map(|(idx, c)| accept(ratio_folded(&folded, &c.folded), self.threshold).map(|s| (idx, s)))
            .collect()
    }

    /// Best candidate for a single key.
    pub fn best_match(&self, key: &str) -> Option<(&str, f64)> {
        let accepted = self.sweep(key);
        best_candidate(
            accepted
                .into_iter()
                .map(|(idx, score)| (self.candidates[idx].id.as_str(), score)),
        )
    }

    /// Score every file against every candidate on the pool, then pick each
    /// file's best candidate on the calling thread.
    pub fn run(&self, pool: &WorkerPool, files: Vec<String>) -> FuzzyOutcome {
        let total = files.len() as u64;
        let computations = total * self.candidates.len() as u64;
        let progress = PhaseProgress::new(Phase::Fuzzy, total);

        pool.run(
            files,
            |file| {
                let key = file_key(&file);
                let accepted = self.sweep(&key);
                progress.tick();
                Some((file, key, accepted))
            },
            |swept| {
                progress.finish(&format!("Swept {} files against {} candidates", total, self.candidates.len()));
                let mut out = FuzzyOutcome {
                    computations,
                    ..Default::default()
                };
                for (file, key, accepted) in swept {
                    let best = best_candidate(
                        accepted
                            .into_iter()
                            .map(|(idx, score)| (self.candidates[idx].id.as_str(), score)),
                    );
                    let Some((matched, fuzz_ratio)) = best else {
                        debug!("No candidate for \"{}\" at {}", key, self.threshold);
                        out.unmatched.push(file);
                        continue;
                    };
                    let Some(record) = self.store.get(matched) else {
                        out.unmatched.push(file);
                        continue;
                    };
                    out.assignments.push(Assignment {
                        file,
                        key,
                        record: record.clone(),
                        method: MatchMethod::Fuzzy {
                            fuzz_ratio,
                            matched: matched.to_string(),
                        },
                    });
                }
                out
            },
        )
    }
}
