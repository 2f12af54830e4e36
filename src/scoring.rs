//! Similarity scoring for fuzzy matching.
//!
//! Scores are on a 0-100 scale: `100 * normalized Levenshtein similarity` of
//! the case-folded strings. A one-letter typo in a 17-character identifier
//! scores ~94.

use std::cmp::Ordering;
use strsim::normalized_levenshtein;

use crate::normalize::fold_case;

// ============================================================================
// Score Thresholds
// ============================================================================

/// Score of two identical strings (after case folding)
pub const MAX_SCORE: f64 = 100.0;

/// Score of two strings with nothing in common
pub const MIN_SCORE: f64 = 0.0;

// ============================================================================
// Similarity
// ============================================================================

/// Similarity of two strings that are already case-folded.
pub fn ratio_folded(a: &str, b: &str) -> f64 {
    MAX_SCORE * normalized_levenshtein(a, b)
}

/// Case-insensitive similarity on the 0-100 scale.
pub fn fuzz_ratio(a: &str, b: &str) -> f64 {
    ratio_folded(&fold_case(a), &fold_case(b))
}

/// Score a candidate, keeping it only if it clears the threshold.
pub fn accept(score: f64, threshold: f64) -> Option<f64> {
    (score >= threshold).then_some(score)
}

// ============================================================================
// Candidate Ranking
// ============================================================================

/// Ranking between two accepted candidates, each `(candidate key, score)`.
/// Higher score wins; on a tie the lexicographically smaller key wins, so the
/// outcome never depends on evaluation order.
pub fn rank(a: (&str, f64), b: (&str, f64)) -> Ordering {
    a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0))
}

/// Best of a set of accepted candidates, see [`rank`].
pub fn best_candidate<'a, I>(candidates: I) -> Option<(&'a str, f64)>
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    candidates.into_iter().max_by(|a, b| rank(*a, *b))
}
