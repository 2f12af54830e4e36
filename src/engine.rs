//! Reconciliation orchestrator.
//!
//! Each stage takes the working set by value and returns its delta; this
//! module threads them together in a fixed order:
//!
//! 1. corrections (renames from `bad_files`, exclusions from `ignore`)
//! 2. already-placed filter
//! 3. exact matching (retires records)
//! 4. decision-cache replay and skip filter
//! 5. fuzzy matching against the records no earlier run claimed
//! 6. decision-cache persistence
//!
//! Placement is a separate step ([`place`]) so a caller can inspect the
//! reconciliation before anything moves.

use rustc_hash::{FxHashMap, FxHashSet};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::cache::{DecisionCache, ResponseCache};
use crate::config::{RunOptions, StructureData};
use crate::corrections::{apply_renames, exclude, Rename};
use crate::error::Result;
use crate::fsops::MoveExecutor;
use crate::inventory::InventorySource;
use crate::matcher::{match_exact, FuzzyMatcher};
use crate::models::{Assignment, MatchMethod, RunStats, TrackId};
use crate::normalize::file_key;
use crate::planner::{execute, split_already_placed, MoveReport, Plan, Planner};
use crate::pool::WorkerPool;
use crate::progress::fetch_spinner;
use crate::spotify::{collect_playlist, TrackSource};
use crate::store::{Collision, RecordStore};

/// Everything a run reads but never mutates.
pub struct RunContext<'a> {
    pub structure: &'a StructureData,
    pub options: &'a RunOptions,
    /// `<USB_PATH>/DJ Music`
    pub music_root: &'a Path,
    /// File keys to leave out of the fuzzy pass for this run only
    pub skip: &'a FxHashSet<String>,
}

/// A record claimed by more than one file in the fuzzy pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contested {
    pub track_id: TrackId,
    pub files: Vec<String>,
}

/// A cached decision whose record is no longer available.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaleEntry {
    pub file: String,
    pub track_id: TrackId,
}

#[derive(Debug, Default)]
pub struct Reconciliation {
    pub renames: Vec<Rename>,
    pub excluded: Vec<String>,
    pub already_placed: Vec<String>,
    pub direct: Vec<Assignment>,
    pub cached: Vec<Assignment>,
    pub fuzzy: Vec<Assignment>,
    pub skipped: Vec<String>,
    pub stale_cache: Vec<StaleEntry>,
    pub unmatched: Vec<String>,
    pub contested: Vec<Contested>,
    pub stats: RunStats,
}

impl Reconciliation {
    /// Every assignment: direct, then cached, then fuzzy.
    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.direct.iter().chain(&self.cached).chain(&self.fuzzy)
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Query the playlist service and the remote inventory. Any playlist that
/// fails to resolve aborts the fetch.
pub fn fetch_catalog(
    tracks: &dyn TrackSource,
    inventory: &dyn InventorySource,
    structure: &StructureData,
) -> Result<(ResponseCache, Vec<Collision>)> {
    let mut store = RecordStore::new();
    let mut collisions = Vec::new();
    let spinner = fetch_spinner();
    for (playlist, playlist_id) in &structure.spotify_playlists {
        spinner.set_message(format!("Fetching \"{}\"", playlist));
        let entries = collect_playlist(tracks, playlist, playlist_id)?;
        info!("Got {} tracks from {}", entries.len(), playlist);
        collisions.extend(store.insert_playlist(playlist, &entries));
    }
    spinner.finish_and_clear();
    info!("Got {} tracks in total", store.len());

    let files = inventory.list()?;
    info!("Got {} files from the remote inventory", files.len());
    Ok((
        ResponseCache {
            tracks: store.into_map(),
            files,
        },
        collisions,
    ))
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Pair local files with canonical records.
///
/// `store` is consumed: exact matches retire its records. `cache` gains the
/// new fuzzy acceptances and is persisted when caching is enabled.
pub fn reconcile(
    ctx: &RunContext,
    mut store: RecordStore,
    local_files: Vec<String>,
    cache: &mut DecisionCache,
    pool: &WorkerPool,
    executor: &dyn MoveExecutor,
) -> Result<Reconciliation> {
    let start = Instant::now();
    let mut rec = Reconciliation::default();
    rec.stats.canonical_tracks = store.len();
    rec.stats.local_files = local_files.len();

    let (files, renames) = apply_renames(
        local_files,
        &ctx.structure.bad_files,
        ctx.music_root,
        executor,
    )?;
    rec.renames = renames;

    let (files, excluded) = exclude(files, &ctx.structure.ignore);
    rec.excluded = excluded;

    let (files, placed) = split_already_placed(files, &ctx.structure.user_prefixes());
    rec.already_placed = placed;

    let direct = match_exact(files, &mut store);
    rec.direct = direct.assignments;

    // Replay earlier decisions, drop skipped keys, keep the rest for scoring
    let mut to_score = Vec::new();
    for file in direct.residual {
        let key = file_key(&file);
        if let Some(track_id) = cache.get(&key) {
            match store.get(track_id) {
                Some(record) => rec.cached.push(Assignment {
                    file,
                    key,
                    record: record.clone(),
                    method: MatchMethod::Cached {
                        matched: track_id.clone(),
                    },
                }),
                None => {
                    warn!("Cached match \"{}\" for \"{}\" is no longer available", track_id, key);
                    rec.stale_cache.push(StaleEntry {
                        file,
                        track_id: track_id.clone(),
                    });
                }
            }
        } else if ctx.skip.contains(&key) {
            rec.skipped.push(file);
        } else {
            to_score.push(file);
        }
    }

    let candidates = store.without(&cache.matched_ids());
    if !cache.is_empty() {
        info!(
            "Reduced number of Spotify tracks being considered from {} to {}",
            store.len(),
            candidates.len()
        );
    }

    let matcher = FuzzyMatcher::new(&candidates, ctx.options.fuzz_ratio);
    rec.stats.fuzzy_candidates = matcher.candidate_count();
    let fuzzy = matcher.run(pool, to_score);
    rec.fuzzy = fuzzy.assignments;
    rec.unmatched = fuzzy.unmatched;
    rec.stats.similarity_computations = fuzzy.computations;

    rec.contested = find_contested(&rec.fuzzy);
    for contested in &rec.contested {
        warn!(
            "\"{}\" claimed by {} files: {:?}",
            contested.track_id,
            contested.files.len(),
            contested.files
        );
    }

    if ctx.options.cache_fuzz_results {
        for assignment in &rec.fuzzy {
            cache.append(assignment.key.clone(), assignment.track_id().to_string());
        }
        cache.save()?;
    }

    let stats = &mut rec.stats;
    stats.renamed_files = rec.renames.len();
    stats.excluded_files = rec.excluded.len();
    stats.already_placed = rec.already_placed.len();
    stats.direct_matches = rec.direct.len();
    stats.cached_matches = rec.cached.len();
    stats.stale_cache_entries = rec.stale_cache.len();
    stats.skipped_files = rec.skipped.len();
    stats.fuzzy_matches = rec.fuzzy.len();
    stats.contested_records = rec.contested.len();
    stats.unmatched = rec.unmatched.len();
    stats.elapsed_seconds = start.elapsed().as_secs_f64();

    info!("Fuzzy matched {} files", rec.fuzzy.len());
    info!(
        "Unable to find {} tracks (plus the {} in ignore)",
        rec.unmatched.len(),
        ctx.structure.ignore.len()
    );
    Ok(rec)
}

/// Records the fuzzy pass handed to more than one file, sorted by identifier.
fn find_contested(fuzzy: &[Assignment]) -> Vec<Contested> {
    let mut claims: FxHashMap<&str, Vec<String>> = FxHashMap::default();
    for assignment in fuzzy {
        claims
            .entry(assignment.track_id())
            .or_default()
            .push(assignment.file.clone());
    }
    let mut contested: Vec<Contested> = claims
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .map(|(track_id, files)| Contested {
            track_id: track_id.to_string(),
            files,
        })
        .collect();
    contested.sort_by(|a, b| a.track_id.cmp(&b.track_id));
    contested
}

// ============================================================================
// Placement
// ============================================================================

/// Plan and carry out the moves for every assignment.
pub fn place(ctx: &RunContext, rec: &mut Reconciliation, executor: &dyn MoveExecutor) -> (Plan, MoveReport) {
    let planner = Planner::new(
        ctx.music_root,
        &ctx.structure.users,
        &ctx.structure.playlist_genres,
    );
    let assignments: Vec<Assignment> = rec.assignments().cloned().collect();
    let plan = planner.plan(&assignments);
    let report = execute(&plan, executor);

    rec.stats.moves_planned = plan.moves.len();
    rec.stats.placements_skipped = plan.skipped.len();
    rec.stats.moves_executed = report.executed;
    rec.stats.moves_failed = report.failures.len();
    (plan, report)
}

// ============================================================================
// Reporting
// ============================================================================

/// `"<score>: <file key>"` followed by the matched identifier, per fuzzy match.
pub fn fuzzy_listing(rec: &Reconciliation) -> Vec<String> {
    rec.fuzzy
        .iter()
        .filter_map(|assignment| {
            let score = assignment.method.fuzz_ratio()?;
            Some(format!("{:.1}: {}\n    {}", score, assignment.key, assignment.track_id()))
        })
        .collect()
}

/// Per-file fuzzy listing, only at verbosity > 0.
pub fn log_fuzzy_matches(ctx: &RunContext, rec: &Reconciliation) {
    if ctx.options.verbosity == 0 || rec.fuzzy.is_empty() {
        return;
    }
    info!("Fuzzy matched files:");
    for line in fuzzy_listing(rec) {
        info!("\t{}", line);
    }
}

pub fn log_unmatched(rec: &Reconciliation) {
    if rec.unmatched.is_empty() {
        return;
    }
    info!("Unmatched files:");
    for file in &rec.unmatched {
        info!("\t{}", file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FUZZ_CACHE_FILE;
    use crate::fsops::DryRun;
    use crate::models::{PlaylistEntry, Record};
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn record(by: &str, playlist: &str) -> Record {
        Record {
            added_at: "2021-03-04T05:06:07Z".to_string(),
            added_by: by.to_string(),
            playlist: playlist.to_string(),
        }
    }

    fn structure() -> StructureData {
        let mut data = StructureData::default();
        data.spotify_playlists.insert("P1".to_string(), "pl1".to_string());
        data.playlist_genres.insert("P1".to_string(), "House".to_string());
        data.users.insert("u1".to_string(), "alice".to_string());
        data
    }

    fn store(ids: &[&str]) -> RecordStore {
        let mut map = crate::models::TrackMap::default();
        for id in ids {
            map.insert(id.to_string(), record("u1", "P1"));
        }
        RecordStore::from_map(map)
    }

    fn files(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    fn pairs(rec: &Reconciliation) -> BTreeSet<(String, String)> {
        rec.assignments()
            .map(|a| (a.file.clone(), a.track_id().to_string()))
            .collect()
    }

    struct Harness {
        structure: StructureData,
        options: RunOptions,
        root: PathBuf,
        skip: FxHashSet<String>,
    }

    impl Harness {
        fn new(structure: StructureData, options: RunOptions) -> Self {
            Self {
                structure,
                options,
                root: PathBuf::from("/usb/DJ Music"),
                skip: FxHashSet::default(),
            }
        }

        fn ctx(&self) -> RunContext<'_> {
            RunContext {
                structure: &self.structure,
                options: &self.options,
                music_root: &self.root,
                skip: &self.skip,
            }
        }
    }

    #[test]
    fn test_exact_then_fuzzy() {
        let h = Harness::new(structure(), RunOptions::default());
        let mut cache = DecisionCache::empty("unused.json");
        let pool = WorkerPool::new(2).unwrap();
        let rec = reconcile(
            &h.ctx(),
            store(&["Song A - Artist X", "Song B - Artist Y"]),
            files(&["Song A - Artist X.mp3", "Dir/Song B - Artst Y.mp3", "Dir/Nope - Nobody.mp3"]),
            &mut cache,
            &pool,
            &DryRun::new(),
        )
        .unwrap();

        assert_eq!(rec.direct.len(), 1);
        assert_eq!(rec.direct[0].file, "Song A - Artist X.mp3");
        assert_eq!(rec.fuzzy.len(), 1);
        assert_eq!(rec.fuzzy[0].track_id(), "Song B - Artist Y");
        assert_eq!(rec.unmatched, files(&["Dir/Nope - Nobody.mp3"]));
        // exact-matched record is not offered to the fuzzy pass
        assert_eq!(rec.stats.fuzzy_candidates, 1);
        assert_eq!(rec.stats.similarity_computations, 2);
        // caching disabled
        assert!(cache.is_empty());
    }

    #[test]
    fn test_excluded_never_assigned() {
        let mut data = structure();
        data.ignore.insert("Song A - Artist X".to_string());
        data.ignore.insert("Song B - Artst Y".to_string());
        let h = Harness::new(data, RunOptions { fuzz_ratio: 0.0, ..Default::default() });
        let mut cache = DecisionCache::empty("unused.json");
        let rec = reconcile(
            &h.ctx(),
            store(&["Song A - Artist X", "Song B - Artist Y"]),
            files(&["Song A - Artist X.mp3", "Song B - Artst Y.mp3"]),
            &mut cache,
            &WorkerPool::new(2).unwrap(),
            &DryRun::new(),
        )
        .unwrap();
        assert_eq!(rec.assignments().count(), 0);
        assert_eq!(rec.excluded.len(), 2);
        assert_eq!(rec.stats.similarity_computations, 0);
    }

    #[test]
    fn test_already_placed_and_skip() {
        let mut h = Harness::new(structure(), RunOptions::default());
        h.skip.insert("Song B - Artst Y".to_string());
        let mut cache = DecisionCache::empty("unused.json");
        let rec = reconcile(
            &h.ctx(),
            store(&["Song A - Artist X", "Song B - Artist Y"]),
            files(&["alice/House/old/Song A - Artist X.mp3", "Song B - Artst Y.mp3"]),
            &mut cache,
            &WorkerPool::new(2).unwrap(),
            &DryRun::new(),
        )
        .unwrap();
        assert_eq!(rec.already_placed, files(&["alice/House/old/Song A - Artist X.mp3"]));
        assert_eq!(rec.skipped, files(&["Song B - Artst Y.mp3"]));
        assert_eq!(rec.assignments().count(), 0);
    }

    #[test]
    fn test_dry_run_rename_feeds_exact_match() {
        let mut data = structure();
        data.bad_files.insert("typo.mp3".to_string(), "Song A - Artist X.mp3".to_string());
        let h = Harness::new(data, RunOptions::default());
        let dry = DryRun::new();
        let rec = reconcile(
            &h.ctx(),
            store(&["Song A - Artist X"]),
            files(&["dir/typo.mp3"]),
            &mut DecisionCache::empty("unused.json"),
            &WorkerPool::new(1).unwrap(),
            &dry,
        )
        .unwrap();
        assert_eq!(rec.renames.len(), 1);
        assert_eq!(rec.direct.len(), 1);
        assert_eq!(rec.direct[0].file, "dir/Song A - Artist X.mp3");
    }

    #[test]
    fn test_fuzzy_listing() {
        let h = Harness::new(structure(), RunOptions::default());
        let rec = reconcile(
            &h.ctx(),
            store(&["Song A - Artist X", "Song B - Artist Y"]),
            files(&["Song A - Artist X.mp3", "Dir/Song B - Artst Y.mp3"]),
            &mut DecisionCache::empty("unused.json"),
            &WorkerPool::new(1).unwrap(),
            &DryRun::new(),
        )
        .unwrap();
        // exact matches are not listed
        assert_eq!(fuzzy_listing(&rec), vec!["94.1: Song B - Artst Y\n    Song B - Artist Y".to_string()]);
    }

    #[test]
    fn test_fuzzy_record_stays_available_and_is_contested() {
        let h = Harness::new(structure(), RunOptions::default());
        let rec = reconcile(
            &h.ctx(),
            store(&["Song A - Artist X"]),
            files(&["a/Song A - Artst X.mp3", "b/Song A - Artist Z.mp3"]),
            &mut DecisionCache::empty("unused.json"),
            &WorkerPool::new(2).unwrap(),
            &DryRun::new(),
        )
        .unwrap();
        assert_eq!(rec.fuzzy.len(), 2);
        assert_eq!(
            rec.contested,
            vec![Contested {
                track_id: "Song A - Artist X".to_string(),
                files: files(&["a/Song A - Artst X.mp3", "b/Song A - Artist Z.mp3"]),
            }]
        );
    }

    #[test]
    fn test_decision_cache_idempotence() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join(FUZZ_CACHE_FILE);
        let h = Harness::new(
            structure(),
            RunOptions {
                cache_fuzz_results: true,
                ..Default::default()
            },
        );
        let pool = WorkerPool::new(2).unwrap();
        let ids = ["Song A - Artist X", "Song B - Artist Y", "Song C - Artist Z"];
        let inventory = files(&["Song A - Artist X.mp3", "x/Song B - Artst Y.mp3", "y/Sng C - Artist Z.mp3"]);

        let mut cache = DecisionCache::load(&cache_path).unwrap();
        let first = reconcile(&h.ctx(), store(&ids), inventory.clone(), &mut cache, &pool, &DryRun::new()).unwrap();
        assert_eq!(first.fuzzy.len(), 2);
        assert!(first.stats.similarity_computations > 0);
        assert!(cache_path.exists());

        let mut cache = DecisionCache::load(&cache_path).unwrap();
        assert_eq!(cache.len(), 2);
        let second = reconcile(&h.ctx(), store(&ids), inventory, &mut cache, &pool, &DryRun::new()).unwrap();

        assert_eq!(pairs(&first), pairs(&second));
        assert_eq!(second.cached.len(), 2);
        assert!(second.fuzzy.is_empty());
        assert_eq!(second.stats.similarity_computations, 0);
        assert_eq!(cache.appended(), 0);
    }

    #[test]
    fn test_cached_ids_removed_from_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join(FUZZ_CACHE_FILE);
        std::fs::write(&cache_path, r#"{"Song A - Artst X": "Song A - Artist X"}"#).unwrap();
        let h = Harness::new(structure(), RunOptions::default());
        let mut cache = DecisionCache::load(&cache_path).unwrap();
        let rec = reconcile(
            &h.ctx(),
            store(&["Song A - Artist X"]),
            files(&["other/Song A - Artist Xx.mp3"]),
            &mut cache,
            &WorkerPool::new(1).unwrap(),
            &DryRun::new(),
        )
        .unwrap();
        assert_eq!(rec.stats.fuzzy_candidates, 0);
        assert_eq!(rec.unmatched, files(&["other/Song A - Artist Xx.mp3"]));
    }

    #[test]
    fn test_stale_cache_entry() {
        let h = Harness::new(structure(), RunOptions::default());
        let mut cache = DecisionCache::empty("unused.json");
        cache.append("Old - Name".to_string(), "Gone - Track".to_string());
        let rec = reconcile(
            &h.ctx(),
            store(&["Song A - Artist X"]),
            files(&["Old - Name.mp3"]),
            &mut cache,
            &WorkerPool::new(1).unwrap(),
            &DryRun::new(),
        )
        .unwrap();
        assert_eq!(
            rec.stale_cache,
            vec![StaleEntry {
                file: "Old - Name.mp3".to_string(),
                track_id: "Gone - Track".to_string()
            }]
        );
        assert_eq!(rec.assignments().count(), 0);
    }

    #[test]
    fn test_place_dry_run() {
        let h = Harness::new(structure(), RunOptions::default());
        let dry = DryRun::new();
        let mut rec = reconcile(
            &h.ctx(),
            store(&["Song A - Artist X"]),
            files(&["Song A - Artist X.mp3"]),
            &mut DecisionCache::empty("unused.json"),
            &WorkerPool::new(1).unwrap(),
            &dry,
        )
        .unwrap();
        let (plan, report) = place(&h.ctx(), &mut rec, &dry);
        assert_eq!(plan.moves.len(), 1);
        assert_eq!(plan.moves[0].to, h.root.join("alice/House/old/Song A - Artist X.mp3"));
        assert_eq!(report.executed, 1);
        assert_eq!(rec.stats.moves_planned, 1);
    }

    struct FakeTracks;

    impl TrackSource for FakeTracks {
        fn playlist_page(
            &self,
            playlist_id: &str,
            offset: usize,
        ) -> std::result::Result<crate::spotify::Page, String> {
            match (playlist_id, offset) {
                ("pl1", 0) => Ok(crate::spotify::Page {
                    entries: vec![PlaylistEntry {
                        title: "Song A".to_string(),
                        artists: vec!["Artist X".to_string()],
                        added_at: "2021-03-04T05:06:07Z".to_string(),
                        added_by: "u1".to_string(),
                    }],
                    next: None,
                }),
                _ => Err("not found".to_string()),
            }
        }
    }

    struct FakeInventory;

    impl InventorySource for FakeInventory {
        fn list(&self) -> Result<Vec<String>> {
            Ok(files(&["House/Song A - Artist X.mp3"]))
        }
    }

    #[test]
    fn test_fetch_catalog() {
        let (catalog, collisions) = fetch_catalog(&FakeTracks, &FakeInventory, &structure()).unwrap();
        assert!(collisions.is_empty());
        assert_eq!(catalog.tracks["Song A - Artist X"], record("u1", "P1"));
        assert_eq!(catalog.files, files(&["House/Song A - Artist X.mp3"]));
    }

    #[test]
    fn test_fetch_catalog_fails_on_unknown_playlist() {
        let mut data = structure();
        data.spotify_playlists.insert("P2".to_string(), "missing".to_string());
        let err = fetch_catalog(&FakeTracks, &FakeInventory, &data).unwrap_err();
        assert!(matches!(err, crate::error::Error::PlaylistLookup { ref id, .. } if id == "missing"));
    }
}
