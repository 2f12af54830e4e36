//! Correction layer: operator fixes applied to the local inventory before
//! any matching happens.
//!
//! `bad_files` maps a misnamed file (typo, wrong formatting) to its corrected
//! basename. `ignore` lists file keys confirmed as unattributable.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fsops::MoveExecutor;
use crate::normalize::{file_key, file_name, join, parent_dir};

/// One applied rename, as inventory paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

/// Rewrite `files` so every `bad_files` entry carries its corrected name.
///
/// The file is located by basename. The executor renames
/// `<root>/<dir>/<bad>` to `<root>/<dir>/<good>` (a dry run only records it);
/// in both modes the in-memory path is updated so downstream matching sees
/// the corrected name. A bad name that cannot be located fails a dry run,
/// unless its corrected name is already present; a commit run skips it.
pub fn apply_renames(
    mut files: Vec<String>,
    bad_files: &BTreeMap<String, String>,
    music_root: &Path,
    executor: &dyn MoveExecutor,
) -> Result<(Vec<String>, Vec<Rename>)> {
    // basename → index; a later duplicate basename wins
    let lookup: FxHashMap<String, usize> = files
        .iter()
        .enumerate()
        .map(|(idx, path)| (file_name(path).to_string(), idx))
        .collect();

    let mut renames = Vec::new();
    for (bad, good) in bad_files {
        let Some(&idx) = lookup.get(bad.as_str()) else {
            if lookup.contains_key(good.as_str()) {
                debug!("\"{}\" already renamed to \"{}\"", bad, good);
                continue;
            }
            // A committed rename leaves the bad name in the cached inventory
            // but not on disk, so later commit runs no longer see it
            if executor.is_commit() {
                warn!("Bad file \"{}\" not found locally, assuming already renamed to \"{}\"", bad, good);
                continue;
            }
            return Err(Error::CorrectionLookup { name: bad.clone() });
        };

        let dir = parent_dir(&files[idx]).to_string();
        let from = join(&dir, bad);
        let to = join(&dir, good);
        executor.rename(&music_root.join(&from), &music_root.join(&to))?;
        files[idx] = to.clone();
        renames.push(Rename { from, to });
    }

    if !renames.is_empty() {
        info!(
            "{} {} misnamed files",
            if executor.is_commit() { "Renamed" } else { "Emulated renaming" },
            renames.len()
        );
    }
    Ok((files, renames))
}

/// Split off files whose key is in the exclusion set. Excluded files are
/// never matched, not even exactly.
pub fn exclude(files: Vec<String>, ignore: &FxHashSet<String>) -> (Vec<String>, Vec<String>) {
    let (excluded, kept): (Vec<String>, Vec<String>) = files
        .into_iter()
        .partition(|file| ignore.contains(&file_key(file)));
    if !excluded.is_empty() {
        info!("Excluding {} files listed in ignore", excluded.len());
    }
    (kept, excluded)
}
